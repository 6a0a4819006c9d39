//! Benchmark-only crate; see `benches/reasoning_bank.rs`.
