#![forbid(unsafe_code)]

use cnx_ast::LineIndex;

use crate::error::{AnalyzerDiagnostic, CODE_COMMENT_NESTED, CODE_COMMENT_SPLICE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentKind {
    Line,
    Block,
}

/// One comment lifted off the hidden channel, with its body text
/// (delimiters stripped) and source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Comment {
    pub kind: CommentKind,
    pub body: String,
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

/// Extract every comment from raw source text. String and character
/// literals are opaque; comment markers inside them do not count.
pub fn extract_comments(src: &str) -> Vec<Comment> {
    let index = LineIndex::new(src);
    let bytes = src.as_bytes();
    let mut comments = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                let start = i;
                i += 2;
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                let (line, column) = index.line_col(start);
                comments.push(Comment {
                    kind: CommentKind::Line,
                    body: src[start + 2..i].to_string(),
                    offset: start,
                    line,
                    column,
                });
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                let start = i;
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                let end = i.min(bytes.len());
                i = (i + 2).min(bytes.len());
                let (line, column) = index.line_col(start);
                comments.push(Comment {
                    kind: CommentKind::Block,
                    body: src[start + 2..end].to_string(),
                    offset: start,
                    line,
                    column,
                });
            }
            _ => i += 1,
        }
    }

    comments
}

/// MISRA comment rules: no `/*` or `//` inside a comment body (the `://`
/// of a URI is exempt), and no line-splice backslash at the end of a
/// line comment.
pub fn validate_comments(comments: &[Comment]) -> Vec<AnalyzerDiagnostic> {
    let mut diagnostics = Vec::new();

    for c in comments {
        if let Some(marker) = find_nested_marker(&c.body) {
            diagnostics.push(AnalyzerDiagnostic {
                code: CODE_COMMENT_NESTED,
                line: c.line,
                column: c.column,
                message: format!("comment contains nested '{marker}' (MISRA C:2012 Rule 3.1)"),
            });
        }

        if c.kind == CommentKind::Line && c.body.trim_end_matches([' ', '\t']).ends_with('\\') {
            diagnostics.push(AnalyzerDiagnostic {
                code: CODE_COMMENT_SPLICE,
                line: c.line,
                column: c.column,
                message: "line comment ends with a line-splice '\\' (MISRA C:2012 Rule 3.2)"
                    .to_string(),
            });
        }
    }

    diagnostics
}

fn find_nested_marker(body: &str) -> Option<&'static str> {
    let bytes = body.as_bytes();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1] == b'*' {
            return Some("/*");
        }
        if bytes[i] == b'/' && bytes[i + 1] == b'/' {
            // URI schemes (`http://`, `file://`) are allowed.
            if i > 0 && bytes[i - 1] == b':' {
                i += 2;
                continue;
            }
            return Some("//");
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_line_and_block_comments() {
        let src = "u8 x; // trailing\n/* block\n spans */ u8 y;";
        let comments = extract_comments(src);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].kind, CommentKind::Line);
        assert_eq!(comments[0].body, " trailing");
        assert_eq!(comments[1].kind, CommentKind::Block);
        assert_eq!(comments[1].line, 2);
    }

    #[test]
    fn markers_inside_strings_do_not_count() {
        let src = "string<15> s <- \"// not a comment\";";
        assert!(extract_comments(src).is_empty());
    }

    #[test]
    fn nested_block_marker_is_rejected() {
        let comments = extract_comments("/* outer /* inner */");
        let diags = validate_comments(&comments);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "MISRA-3.1");
    }

    #[test]
    fn nested_line_marker_in_line_comment_is_rejected() {
        let comments = extract_comments("// see // twice\n");
        let diags = validate_comments(&comments);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn uri_in_comment_is_allowed() {
        let comments = extract_comments("// docs: https://example.com/page\n");
        assert!(validate_comments(&comments).is_empty());
    }

    #[test]
    fn line_splice_backslash_is_rejected() {
        let comments = extract_comments("// continued \\\nu8 x;");
        let diags = validate_comments(&comments);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "MISRA-3.2");
    }
}
