use std::fmt::Display;

use story_core::StoryError;

fn map_error(code: &'static str, error: impl Display) -> StoryError {
    StoryError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: StoryError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    match serde_json::to_string(&error.message) {
        Ok(message) => println!("ERROR_MSG_JSON:{}", message),
        Err(_) => println!("ERROR_MSG_JSON:\"\""),
    }
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> StoryError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> StoryError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> StoryError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_output(error: serde_json::Error) -> StoryError {
    map_error("CLI_OUTPUT", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(StoryError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(
            map_cli_source_path(std::io::Error::other("path")).code,
            "CLI_SOURCE_PATH"
        );
        let strip_error = std::path::Path::new("/a")
            .strip_prefix("/b")
            .expect_err("strip prefix");
        assert_eq!(map_cli_source_scan(strip_error).code, "CLI_SOURCE_SCAN");
        assert_eq!(
            map_cli_source_read(std::io::Error::other("read")).code,
            "CLI_SOURCE_READ"
        );
        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(map_cli_output(invalid).code, "CLI_OUTPUT");
    }
}
