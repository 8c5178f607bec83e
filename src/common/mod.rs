//! Shared low-level utilities. Only `buffer` (the bidirectional-copy
//! algorithm the relay reuses) survives here; `error`, `net`, and `socks`
//! were superseded by the crate-root `error`, `address`, and `socks5`
//! modules respectively, and the perf-heuristic submodules
//! (`memory_pressure`, `pool_predictor`, `proxy_node_selection`,
//! `http_pool`) had no counterpart in this crate's scope at all.

pub mod buffer;
