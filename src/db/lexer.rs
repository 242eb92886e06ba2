//! Lexical scanning of SQL text.
//!
//! Separates code from string literals, quoted identifiers, dollar-quoted
//! bodies and comments. Used to split restore scripts on `;` and to find
//! keywords such as `RETURNING` without matching inside names or literals.
//! An unterminated literal swallows the rest of the input.

/// One lexical piece of SQL text.
enum Token<'a> {
    /// A character of plain code.
    Code(char),
    /// A complete quoted literal, identifier or dollar-quoted body.
    Quoted(&'a [char]),
    /// A comment; it separates words like whitespace.
    Comment,
    /// A `;` outside any quoting.
    Terminator,
}

fn scan<'a>(chars: &'a [char], mut emit: impl FnMut(Token<'a>)) {
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\'' | '"' => {
                let end = quoted_end(chars, i, c);
                emit(Token::Quoted(&chars[i..end]));
                i = end;
            }
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                emit(Token::Comment);
            }
            '/' if next == Some('*') => {
                i = block_comment_end(chars, i);
                emit(Token::Comment);
            }
            '$' => match dollar_tag(chars, i) {
                Some(tag_len) => {
                    let end = dollar_body_end(chars, i, tag_len);
                    emit(Token::Quoted(&chars[i..end]));
                    i = end;
                }
                None => {
                    emit(Token::Code(c));
                    i += 1;
                }
            },
            ';' => {
                emit(Token::Terminator);
                i += 1;
            }
            _ => {
                emit(Token::Code(c));
                i += 1;
            }
        }
    }
}

/// Split `script` into trimmed, non-empty statements without the trailing `;`.
/// Comments are replaced by a single space.
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();

    scan(&chars, |token| match token {
        Token::Code(c) => current.push(c),
        Token::Quoted(text) => current.extend(text),
        Token::Comment => {
            if !current.ends_with(char::is_whitespace) {
                current.push(' ');
            }
        }
        Token::Terminator => flush(&mut current, &mut statements),
    });
    flush(&mut current, &mut statements);
    statements
}

fn flush(current: &mut String, statements: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// True when `keyword` appears as a whole unquoted word of `sql`
/// (case-insensitive).
pub fn contains_keyword(sql: &str, keyword: &str) -> bool {
    let chars: Vec<char> = sql.chars().collect();
    let mut word = String::new();
    let mut found = false;

    let end_word = |word: &mut String, found: &mut bool| {
        if !word.is_empty() {
            *found |= word.eq_ignore_ascii_case(keyword);
            word.clear();
        }
    };

    scan(&chars, |token| match token {
        Token::Code(c) if c.is_alphanumeric() || c == '_' || c == '$' => word.push(c),
        _ => end_word(&mut word, &mut found),
    });
    end_word(&mut word, &mut found);
    found
}

/// Index just past the closing quote; a doubled quote is an escaped one.
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Block comments nest in PostgreSQL.
fn block_comment_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// Length of the `$tag$` opener at `start`, if there is one.
///
/// `$1` placeholders and `$` inside identifiers are not openers.
fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    if start > 0 && (chars[start - 1].is_alphanumeric() || chars[start - 1] == '_') {
        return None;
    }
    if chars.get(start + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut i = start + 1;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    (chars.get(i) == Some(&'$')).then_some(i + 1 - start)
}

fn dollar_body_end(chars: &[char], start: usize, tag_len: usize) -> usize {
    let tag = &chars[start..start + tag_len];
    let mut i = start + tag_len;
    while i + tag_len <= chars.len() {
        if &chars[i..i + tag_len] == tag {
            return i + tag_len;
        }
        i += 1;
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_statements() {
        assert_eq!(
            split_statements("SELECT 1;\nSELECT 2;  \n"),
            vec!["SELECT 1", "SELECT 2"]
        );
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
        assert!(split_statements(" ;; \n").is_empty());
    }

    #[test]
    fn test_semicolons_inside_literals_and_identifiers() {
        let script = r#"INSERT INTO "we;ird" ("a") VALUES ('x;y', 'it''s; fine');SELECT 2;"#;
        assert_eq!(
            split_statements(script),
            vec![
                r#"INSERT INTO "we;ird" ("a") VALUES ('x;y', 'it''s; fine')"#,
                "SELECT 2"
            ]
        );
    }

    #[test]
    fn test_dollar_quoted_bodies() {
        let script = "CREATE FUNCTION f() RETURNS int AS $$ BEGIN RETURN 1; END; $$ LANGUAGE plpgsql;\n\
                      CREATE FUNCTION g() RETURNS text AS $body$ SELECT 'a;$$b' $body$ LANGUAGE sql;";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("END; $$ LANGUAGE plpgsql"));
        assert!(statements[1].contains("$body$ SELECT 'a;$$b' $body$"));
    }

    #[test]
    fn test_placeholders_are_not_dollar_quotes() {
        assert_eq!(
            split_statements("SELECT $1; SELECT a$b$ FROM t; SELECT 3"),
            vec!["SELECT $1", "SELECT a$b$ FROM t", "SELECT 3"]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        let script = "-- PostgreSQL Database Backup\n-- Note; with semicolon\nSELECT 1; /* block; /* nested; */ still */ SELECT 2;\nSELECT '--not a comment';";
        assert_eq!(
            split_statements(script),
            vec!["SELECT 1", "SELECT 2", "SELECT '--not a comment'"]
        );
    }

    #[test]
    fn test_comment_only_script() {
        assert!(split_statements("-- Database: x\n-- Generated: now\n\n").is_empty());
    }

    #[test]
    fn test_unterminated_literal_takes_the_rest() {
        assert_eq!(
            split_statements("SELECT 1; SELECT 'abc; SELECT 2"),
            vec!["SELECT 1", "SELECT 'abc; SELECT 2"]
        );
    }

    #[test]
    fn test_non_ascii_text() {
        assert_eq!(
            split_statements("INSERT INTO t VALUES ('caf\u{e9}; \u{1F600}');SELECT 1"),
            vec!["INSERT INTO t VALUES ('caf\u{e9}; \u{1F600}')", "SELECT 1"]
        );
    }

    #[test]
    fn test_keyword_as_whole_word() {
        assert!(contains_keyword("DELETE FROM t RETURNING *", "RETURNING"));
        assert!(contains_keyword("insert into t values (1) returning id", "RETURNING"));
        assert!(contains_keyword("UPDATE t SET a = 1\nRETURNING(a)", "RETURNING"));
    }

    #[test]
    fn test_keyword_not_matched_inside_names_or_literals() {
        for sql in [
            "UPDATE returning_x SET a = 1",
            "UPDATE t SET is_returning = true",
            "UPDATE t SET note = 'returning soon'",
            r#"UPDATE "RETURNING" SET a = 1"#,
            "UPDATE t SET a = 1 -- returning later",
            "UPDATE t SET a = 1 /* RETURNING */",
            "UPDATE t SET body = $$ RETURNING $$",
        ] {
            assert!(!contains_keyword(sql, "RETURNING"), "{}", sql);
        }
    }
}
