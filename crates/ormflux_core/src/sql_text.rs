//! Plain-text scanning over SQL statements: placeholder positions and the
//! leading keyword, with comments, string literals and quoted identifiers
//! skipped.

/// Positions of top-level `?` placeholders plus the first identifier of the
/// statement (drivers use it to detect `SELECT`).
pub fn find_subst_signs(sql: &str) -> (Vec<usize>, String) {
    #[derive(PartialEq)]
    enum State {
        Normal,
        MinusFound,
        LineComment,
        SlashFound,
        Comment,
        CommentAsterFound,
        InQuote,
        InQuoteQFound,
        InDoubleQuote,
    }

    let mut positions = Vec::new();
    let mut first_word = String::new();
    let mut found_first_word = false;
    let mut st = State::Normal;

    for (i, c) in sql.char_indices() {
        match st {
            State::Normal => {
                if !found_first_word {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        first_word.push(c);
                    } else if !c.is_whitespace() || !first_word.is_empty() {
                        found_first_word = true;
                    }
                }
                match c {
                    '-' => st = State::MinusFound,
                    '/' => st = State::SlashFound,
                    '"' => st = State::InDoubleQuote,
                    '\'' => st = State::InQuote,
                    '?' => positions.push(i),
                    _ => {}
                }
            }
            State::MinusFound => {
                st = if c == '-' {
                    State::LineComment
                } else {
                    match c {
                        '/' => State::SlashFound,
                        '"' => State::InDoubleQuote,
                        '\'' => State::InQuote,
                        '?' => {
                            positions.push(i);
                            State::Normal
                        }
                        _ => State::Normal,
                    }
                };
            }
            State::LineComment => {
                if c == '\n' {
                    st = State::Normal;
                }
            }
            State::SlashFound => {
                st = if c == '*' {
                    State::Comment
                } else {
                    match c {
                        '-' => State::MinusFound,
                        '"' => State::InDoubleQuote,
                        '\'' => State::InQuote,
                        '?' => {
                            positions.push(i);
                            State::Normal
                        }
                        _ => State::Normal,
                    }
                };
            }
            State::Comment => {
                if c == '*' {
                    st = State::CommentAsterFound;
                }
            }
            State::CommentAsterFound => {
                st = if c == '/' {
                    State::Normal
                } else if c == '*' {
                    State::CommentAsterFound
                } else {
                    State::Comment
                };
            }
            State::InQuote => {
                if c == '\'' {
                    st = State::InQuoteQFound;
                }
            }
            State::InQuoteQFound => {
                st = match c {
                    '\'' => State::InQuote,
                    '-' => State::MinusFound,
                    '/' => State::SlashFound,
                    '"' => State::InDoubleQuote,
                    '?' => {
                        positions.push(i);
                        State::Normal
                    }
                    _ => State::Normal,
                };
            }
            State::InDoubleQuote => {
                if c == '"' {
                    st = State::Normal;
                }
            }
        }
    }
    (positions, first_word)
}

/// Rewrite `?` placeholders into numbered `:1 … :n` form.
pub fn to_numbered_params(sql: &str) -> String {
    let (positions, _) = find_subst_signs(sql);
    if positions.is_empty() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut start = 0;
    for (n, &pos) in positions.iter().enumerate() {
        out.push_str(&sql[start..pos]);
        out.push(':');
        out.push_str(&(n + 1).to_string());
        start = pos + 1;
    }
    out.push_str(&sql[start..]);
    out
}

/// First top-level identifier of the statement, upper-cased.
pub fn first_word(sql: &str) -> String {
    let (_, word) = find_subst_signs(sql);
    word.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_placeholders_in_order() {
        assert_eq!(
            to_numbered_params("INSERT INTO T (A, B) VALUES (?, ?)"),
            "INSERT INTO T (A, B) VALUES (:1, :2)"
        );
    }

    #[test]
    fn skips_string_literals_and_quoted_identifiers() {
        assert_eq!(
            to_numbered_params("SELECT '?' || \"C?\" FROM T WHERE A = ?"),
            "SELECT '?' || \"C?\" FROM T WHERE A = :1"
        );
        assert_eq!(
            to_numbered_params("SELECT 'it''s ?' FROM T WHERE A = ?"),
            "SELECT 'it''s ?' FROM T WHERE A = :1"
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            to_numbered_params("SELECT A -- is it ?\nFROM T WHERE B = ?"),
            "SELECT A -- is it ?\nFROM T WHERE B = :1"
        );
        assert_eq!(
            to_numbered_params("SELECT A /* ? */ FROM T WHERE B = ?"),
            "SELECT A /* ? */ FROM T WHERE B = :1"
        );
    }

    #[test]
    fn single_minus_or_slash_does_not_open_a_comment() {
        assert_eq!(
            to_numbered_params("SELECT A - B / C FROM T WHERE D = ?"),
            "SELECT A - B / C FROM T WHERE D = :1"
        );
    }

    #[test]
    fn extracts_the_first_word() {
        assert_eq!(first_word("  select * from t"), "SELECT");
        assert_eq!(first_word("UPDATE T SET A = ?"), "UPDATE");
        assert_eq!(first_word(""), "");
    }

    #[test]
    fn no_placeholders_round_trips() {
        let sql = "SELECT 1";
        assert_eq!(to_numbered_params(sql), sql);
    }
}
