use env_logger::Builder;
use log::LevelFilter;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn initialize_logger() {
    INIT.call_once(|| {
        let mut builder = Builder::new();

        builder
            .filter_level(LevelFilter::Info)
            .filter_module("keeldb", LevelFilter::Debug)
            .filter_module("keeldb::buffer", LevelFilter::Debug)
            .filter_module("keeldb::container", LevelFilter::Debug)
            .filter_module("keeldb::concurrency", LevelFilter::Debug)
            .format_timestamp_millis()
            .parse_default_env()
            .is_test(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{debug, info};

    #[test]
    fn test_logging_levels() {
        initialize_logger();
        debug!("Debug message in test");
        info!("Info message in test");
    }
}
