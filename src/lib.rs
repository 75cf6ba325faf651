pub mod commands;
pub mod config;
pub mod crypto;
pub mod ecies;
pub mod gateway;
pub mod rpc;
pub mod secrets;
pub mod secrets_manager;
pub mod signer;

#[cfg(test)]
mod test_support;

/// Set up `env_logger` for the binaries; `RUST_LOG` overrides the `info` default
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
