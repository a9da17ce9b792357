// Parsers for model output

pub mod json_block;

pub use json_block::{find_json_object, parse_json_object, JsonExtractError};
