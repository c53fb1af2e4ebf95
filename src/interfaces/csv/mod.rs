pub mod account_reader;
pub mod account_writer;
pub mod request_reader;
