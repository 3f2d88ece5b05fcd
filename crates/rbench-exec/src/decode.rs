use rbench_core::PipelineError;
use serde_json::{Map, Value};

/// Parse the script's result from its captured stdout.
///
/// Only the last non-empty line counts; everything before it is diagnostic
/// noise. The line must be a JSON object.
pub fn decode_output(raw_stdout: &str) -> Result<Map<String, Value>, PipelineError> {
    let Some(line) = raw_stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
        return Err(PipelineError::MalformedOutput {
            line: String::new(),
            reason: "no output".into(),
        });
    };

    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(PipelineError::MalformedOutput {
            line: line.to_string(),
            reason: format!("expected a JSON object, got {}", json_type(&other)),
        }),
        Err(e) => Err(PipelineError::MalformedOutput {
            line: line.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn malformed_line(res: Result<Map<String, Value>, PipelineError>) -> String {
        match res {
            Err(PipelineError::MalformedOutput { line, .. }) => line,
            other => panic!("expected malformed output, got {other:?}"),
        }
    }

    #[test]
    fn decodes_single_line() {
        let map = decode_output("{\"inserted\":\"data\",\"versions\":[\"3.2\",\"4.0\"]}\n").unwrap();
        assert_eq!(map["inserted"], json!("data"));
        assert_eq!(map["versions"], json!(["3.2", "4.0"]));
    }

    #[test]
    fn ignores_leading_noise_and_trailing_blank_lines() {
        let out = "warming up...\n{\"not\": \"this\"}\nrun 1: 0.2s\n{\"k\": 1}\n\n  \r\n";
        let map = decode_output(out).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["k"], json!(1));
    }

    #[test]
    fn handles_crlf_output() {
        let map = decode_output("noise\r\n{\"mri\":\"3.3.0\"}\r\n").unwrap();
        assert_eq!(map["mri"], json!("3.3.0"));
    }

    #[test]
    fn empty_output_is_malformed() {
        assert_eq!(malformed_line(decode_output("")), "");
        assert_eq!(malformed_line(decode_output("\n \n")), "");
    }

    #[test]
    fn final_line_must_be_json() {
        assert_eq!(malformed_line(decode_output("{\"k\": 1}\ndone\n")), "done");
    }

    #[test]
    fn final_line_must_be_an_object() {
        assert_eq!(malformed_line(decode_output("[1, 2]\n")), "[1, 2]");
        assert_eq!(malformed_line(decode_output("\"text\"")), "\"text\"");
    }
}
