//! GraphQL query/mutation classification.
//!
//! A full GraphQL parser is too heavy for this one decision; instead we scan
//! for the first keyword token outside of whitespace, comments, and string
//! literals (`spec.md` §4.7 step 3, §9 "GraphQL classification"). This must
//! satisfy P6: a `mutation` token appearing inside a quoted string must not
//! flip the classification.

/// The two shapes a GraphQL document can have for our purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphqlOperation {
    Query,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    LineComment,
    BlockString,
    String,
}

/// Classify `document` as a query or mutation by inspecting its leading
/// keyword, ignoring `#` line comments, `"""..."""` block strings, and
/// `"..."` strings (with backslash escapes honored inside regular strings;
/// block strings in GraphQL do not support escapes other than `\"""`).
pub fn classify(document: &str) -> GraphqlOperation {
    let bytes = document.as_bytes();
    let mut i = 0;
    let mut state = Scan::Code;
    let mut token_start: Option<usize> = None;

    while i < bytes.len() {
        let c = bytes[i];
        match state {
            Scan::Code => {
                if c == b'#' {
                    state = Scan::LineComment;
                    i += 1;
                } else if document[i..].starts_with("\"\"\"") {
                    state = Scan::BlockString;
                    i += 3;
                } else if c == b'"' {
                    state = Scan::String;
                    i += 1;
                } else if c.is_ascii_whitespace() || c == b',' {
                    if let Some(start) = token_start {
                        return classify_token(&document[start..i]);
                    }
                    i += 1;
                } else if c.is_ascii_alphabetic() || c == b'_' {
                    if token_start.is_none() {
                        token_start = Some(i);
                    }
                    i += 1;
                } else {
                    // Punctuation such as `{` ends a bare query shorthand.
                    if let Some(start) = token_start {
                        return classify_token(&document[start..i]);
                    }
                    i += 1;
                }
            }
            Scan::LineComment => {
                if c == b'\n' {
                    state = Scan::Code;
                }
                i += 1;
            }
            Scan::BlockString => {
                if document[i..].starts_with("\"\"\"") {
                    state = Scan::Code;
                    i += 3;
                } else {
                    i += 1;
                }
            }
            Scan::String => {
                if c == b'\\' {
                    i += 2;
                } else if c == b'"' {
                    state = Scan::Code;
                    i += 1;
                } else {
                    i += 1;
                }
            }
        }
    }

    if let Some(start) = token_start {
        return classify_token(&document[start..]);
    }

    // An empty/unparseable document is treated as a query: the safer
    // default, since it cannot mutate anything upstream.
    GraphqlOperation::Query
}

fn classify_token(token: &str) -> GraphqlOperation {
    if token == "mutation" {
        GraphqlOperation::Mutation
    } else {
        GraphqlOperation::Query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_explicit_query() {
        assert_eq!(classify("query { project { id } }"), GraphqlOperation::Query);
    }

    #[test]
    fn classifies_explicit_mutation() {
        assert_eq!(
            classify("mutation { createProject(input: {}) { project { id } } }"),
            GraphqlOperation::Mutation
        );
    }

    #[test]
    fn shorthand_query_with_no_keyword_is_a_query() {
        assert_eq!(classify("{ project(fullPath: \"a/b\") { id } }"), GraphqlOperation::Query);
    }

    #[test]
    fn leading_line_comment_is_skipped() {
        let doc = "# a helpful comment mentioning mutation\nquery { project { id } }";
        assert_eq!(classify(doc), GraphqlOperation::Query);
    }

    #[test]
    fn p6_mutation_keyword_inside_string_is_not_classified_as_mutation() {
        let doc = r#"query { project(fullPath: "mutation") { id } }"#;
        assert_eq!(classify(doc), GraphqlOperation::Query);
    }

    #[test]
    fn p6_mutation_keyword_inside_block_string_is_ignored() {
        let doc = "query { project(description: \"\"\"this is a mutation\"\"\") { id } }";
        assert_eq!(classify(doc), GraphqlOperation::Query);
    }

    #[test]
    fn escaped_quote_inside_string_does_not_end_it_early() {
        let doc = r#"query { project(fullPath: "a\"mutation\"b") { id } }"#;
        assert_eq!(classify(doc), GraphqlOperation::Query);
    }

    #[test]
    fn leading_whitespace_is_ignored() {
        assert_eq!(classify("   \n  mutation { x }"), GraphqlOperation::Mutation);
    }
}
