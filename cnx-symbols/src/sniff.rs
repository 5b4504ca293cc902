#![forbid(unsafe_code)]

use std::sync::LazyLock;

use regex::Regex;

/// Cheap syntactic sniff over the original (pre-preprocessed) header text.
///
/// Any hit routes the header to the C++ declaration scanner and
/// contributes to the run-wide `cpp_detected` flag. The check runs on raw
/// text, so a cache hit for the symbols never skips it.
static CPP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // class definitions (not forward-declared struct pointers)
        r"\bclass\s+[A-Za-z_]\w*",
        r"\bnamespace\s+[A-Za-z_]\w*\s*\{",
        r"\btemplate\s*<",
        // typed enums: enum X : u8 / enum class X
        r"\benum\s+(class\s+)?[A-Za-z_]\w*\s*:\s*[A-Za-z_]",
        r"\benum\s+class\b",
        // operator overloads
        r"\boperator\s*(\+|-|\*|/|==|!=|<<|>>|\[\]|\(\))",
        // default arguments inside a prototype
        r"\([^()]*[A-Za-z_]\w*\s+[A-Za-z_]\w*\s*=\s*[^=)][^()]*\)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static sniff pattern"))
    .collect()
});

pub fn detect_cpp(src: &str) -> bool {
    CPP_PATTERNS.iter().any(|re| re.is_match(src))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_c_header_is_not_cpp() {
        let src = "#ifndef UART_H\ntypedef struct { int baud; } uart_cfg;\nvoid uart_send(int c);\n#endif\n";
        assert!(!detect_cpp(src));
    }

    #[test]
    fn class_keyword_is_cpp() {
        assert!(detect_cpp("class Driver { public: void send(int c); };"));
    }

    #[test]
    fn namespace_is_cpp() {
        assert!(detect_cpp("namespace hal {\nvoid init();\n}"));
    }

    #[test]
    fn typed_enum_is_cpp() {
        assert!(detect_cpp("enum Mode : uint8_t { IDLE, RUN };"));
    }

    #[test]
    fn default_argument_is_cpp() {
        assert!(detect_cpp("void send(int c, int baud = 9600);"));
    }

    #[test]
    fn template_is_cpp() {
        assert!(detect_cpp("template <typename T> T min(T a, T b);"));
    }
}
