pub use keeldb::common::logger::initialize_logger;
