pub mod signature_utils;
pub mod url_utils;
