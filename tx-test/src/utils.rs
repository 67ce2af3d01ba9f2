//! Utility for testing.
use simplelog::{CombinedLogger, Config, LevelFilter, WriteLogger};
use signkit::DefaultSigner;
use std::sync::Arc;

const DEBUG_MODE: bool = false;

pub(crate) fn init_logger() {
    if DEBUG_MODE {
        let _ = std::fs::create_dir_all("./test-output");
        let _ = CombinedLogger::init(vec![
            //TermLogger::new(LevelFilter::Debug, Config::default(), TerminalMode::Mixed),
            WriteLogger::new(
                LevelFilter::Debug,
                Config::default(),
                std::fs::File::create("./test-output/tx_test.log").unwrap(),
            ),
        ]);
    }
}

/// Current-thread runtime with paused clock; sleeps advance instantly.
pub(crate) fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

pub(crate) fn admin() -> Arc<DefaultSigner> {
    Arc::new(DefaultSigner::random("Org1MSP"))
}
