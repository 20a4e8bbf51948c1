//! Batch input and output in CSV form.

pub mod payload_writer;
pub mod request_reader;
