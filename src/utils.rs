pub mod json;
pub mod printing;
pub mod string;
pub mod token;

use serde_json::{Map, Value};

pub type JsonMap = Map<String, Value>;
