//! Statement Splitter (§4.9): dialect-aware segmentation of a SQL script
//! into individual statements. Single pass over the characters, tracking
//! quote/comment/nesting state so that `;` inside a string literal,
//! dollar-quoted block, bracketed identifier, or comment is never mistaken
//! for a statement terminator.

use crate::domain::value_objects::EngineKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Top,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    Bracketed,
    DollarQuoted,
    LineComment,
    BlockComment,
}

pub struct StatementSplitter {
    engine: EngineKind,
}

impl StatementSplitter {
    pub fn new(engine: EngineKind) -> Self {
        Self { engine }
    }

    /// Split `sql` into statements. Each returned statement excludes its
    /// trailing terminator and has no leading/trailing whitespace. Blank
    /// segments (comment-only or empty) are omitted.
    pub fn split(&self, sql: &str) -> Vec<String> {
        let chars: Vec<char> = sql.chars().collect();
        let mut statements = Vec::new();
        let mut current = String::new();
        let mut mode = Mode::Top;
        let mut depth: i32 = 0;
        let mut delimiter = ";".to_string();
        let mut dollar_tag = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            match mode {
                Mode::LineComment => {
                    current.push(c);
                    if c == '\n' {
                        mode = Mode::Top;
                    }
                    i += 1;
                    continue;
                }
                Mode::BlockComment => {
                    current.push(c);
                    if c == '*' && chars.get(i + 1) == Some(&'/') {
                        current.push('/');
                        i += 2;
                        mode = Mode::Top;
                        continue;
                    }
                    i += 1;
                    continue;
                }
                Mode::SingleQuoted => {
                    current.push(c);
                    if c == '\\' && self.engine == EngineKind::Mysql {
                        // MySQL backslash-escapes the next character.
                        if let Some(&next) = chars.get(i + 1) {
                            current.push(next);
                            i += 2;
                            continue;
                        }
                    }
                    if c == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            current.push('\'');
                            i += 2;
                            continue;
                        }
                        mode = Mode::Top;
                    }
                    i += 1;
                    continue;
                }
                Mode::DoubleQuoted => {
                    current.push(c);
                    if c == '"' {
                        if chars.get(i + 1) == Some(&'"') {
                            current.push('"');
                            i += 2;
                            continue;
                        }
                        mode = Mode::Top;
                    }
                    i += 1;
                    continue;
                }
                Mode::Backtick => {
                    current.push(c);
                    if c == '`' {
                        if chars.get(i + 1) == Some(&'`') {
                            current.push('`');
                            i += 2;
                            continue;
                        }
                        mode = Mode::Top;
                    }
                    i += 1;
                    continue;
                }
                Mode::Bracketed => {
                    current.push(c);
                    if c == ']' {
                        mode = Mode::Top;
                    }
                    i += 1;
                    continue;
                }
                Mode::DollarQuoted => {
                    current.push(c);
                    if c == '$' {
                        // Check if the closing tag matches.
                        let tag_len = dollar_tag.chars().count();
                        let rest: String = chars[i + 1..].iter().take(tag_len).collect();
                        if rest == dollar_tag && chars.get(i + 1 + tag_len) == Some(&'$') {
                            current.extend(rest.chars());
                            current.push('$');
                            i += tag_len + 2;
                            mode = Mode::Top;
                            continue;
                        }
                    }
                    i += 1;
                    continue;
                }
                Mode::Top => {}
            }

            // Mode::Top handling below.
            if c == '-' && chars.get(i + 1) == Some(&'-') {
                current.push(c);
                current.push('-');
                i += 2;
                mode = Mode::LineComment;
                continue;
            }
            if c == '/' && chars.get(i + 1) == Some(&'*') {
                current.push(c);
                current.push('*');
                i += 2;
                mode = Mode::BlockComment;
                continue;
            }
            if c == '\'' {
                current.push(c);
                mode = Mode::SingleQuoted;
                i += 1;
                continue;
            }
            if c == '"' {
                current.push(c);
                mode = Mode::DoubleQuoted;
                i += 1;
                continue;
            }
            if c == '`' && self.engine == EngineKind::Mysql {
                current.push(c);
                mode = Mode::Backtick;
                i += 1;
                continue;
            }
            if c == '[' && self.engine == EngineKind::Sqlite {
                current.push(c);
                mode = Mode::Bracketed;
                i += 1;
                continue;
            }
            if c == '$' && self.engine == EngineKind::Postgres {
                if let Some(tag) = dollar_tag_at(&chars, i) {
                    dollar_tag = tag.clone();
                    current.push_str(&format!("${tag}$"));
                    i += tag.len() + 2;
                    mode = Mode::DollarQuoted;
                    continue;
                }
            }
            if c == '(' {
                depth += 1;
            }
            if c == ')' {
                depth -= 1;
            }

            // MySQL `DELIMITER <tok>` directive, recognized at depth 0 only
            // at the start of a fresh statement.
            if self.engine == EngineKind::Mysql
                && depth == 0
                && current.trim().is_empty()
                && starts_with_keyword(&chars, i, "DELIMITER")
            {
                let (new_delim, consumed) = read_delimiter_directive(&chars, i);
                delimiter = new_delim;
                i += consumed;
                current.clear();
                continue;
            }

            if depth == 0 && matches_delimiter(&chars, i, &delimiter) {
                let stmt = current.trim().to_string();
                if !stmt.is_empty() {
                    statements.push(stmt);
                }
                current.clear();
                i += delimiter.chars().count();
                continue;
            }

            current.push(c);
            i += 1;
        }

        let tail = current.trim().to_string();
        if !tail.is_empty() {
            statements.push(tail);
        }
        statements
    }
}

fn matches_delimiter(chars: &[char], i: usize, delimiter: &str) -> bool {
    let dchars: Vec<char> = delimiter.chars().collect();
    if i + dchars.len() > chars.len() {
        return false;
    }
    chars[i..i + dchars.len()] == dchars[..]
}

fn starts_with_keyword(chars: &[char], i: usize, keyword: &str) -> bool {
    let kw: Vec<char> = keyword.chars().collect();
    if i + kw.len() > chars.len() {
        return false;
    }
    chars[i..i + kw.len()]
        .iter()
        .zip(kw.iter())
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Read a `DELIMITER <token>` directive starting at `chars[i]`, returning the
/// new delimiter token and the number of chars consumed (through the
/// trailing newline, if any).
fn read_delimiter_directive(chars: &[char], i: usize) -> (String, usize) {
    let mut j = i + "DELIMITER".len();
    while chars.get(j).is_some_and(|c| c.is_whitespace() && *c != '\n') {
        j += 1;
    }
    let start = j;
    while chars.get(j).is_some_and(|c| !c.is_whitespace()) {
        j += 1;
    }
    let token: String = chars[start..j].iter().collect();
    while chars.get(j).is_some_and(|c| *c != '\n') {
        j += 1;
    }
    if chars.get(j) == Some(&'\n') {
        j += 1;
    }
    (token, j - i)
}

/// If `chars[i]` begins a Postgres dollar-quote opener (`$$` or `$tag$`),
/// return the tag (possibly empty).
fn dollar_tag_at(chars: &[char], i: usize) -> Option<String> {
    if chars.get(i) != Some(&'$') {
        return None;
    }
    let mut j = i + 1;
    let start = j;
    while chars.get(j).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        j += 1;
    }
    if chars.get(j) == Some(&'$') {
        Some(chars[start..j].iter().collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let out = s.split("SELECT 1; SELECT 2;");
        assert_eq!(out, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn semicolon_inside_single_quoted_string_is_not_a_boundary() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let out = s.split("INSERT INTO t VALUES ('a;b'); SELECT 1;");
        assert_eq!(out.len(), 2);
        assert!(out[0].contains("'a;b'"));
    }

    #[test]
    fn doubled_quote_escape_is_preserved() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let out = s.split("INSERT INTO t VALUES ('it''s fine');");
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("it''s fine"));
    }

    #[test]
    fn mysql_backslash_escape_keeps_quote_open() {
        let s = StatementSplitter::new(EngineKind::Mysql);
        let out = s.split(r"INSERT INTO t VALUES ('a\'b;c'); SELECT 1;");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn dollar_quoted_block_is_not_split_on_semicolons() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let sql = "CREATE FUNCTION f() RETURNS void AS $$ BEGIN SELECT 1; SELECT 2; END $$ LANGUAGE plpgsql;";
        let out = s.split(sql);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn tagged_dollar_quote_matches_its_own_tag_only() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let sql = "SELECT $tag$a;b$tag$; SELECT 2;";
        let out = s.split(sql);
        assert_eq!(out.len(), 2);
        assert!(out[0].contains("a;b"));
    }

    #[test]
    fn line_comment_semicolon_is_not_a_boundary() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let sql = "SELECT 1; -- a comment; with a fake terminator\nSELECT 2;";
        let out = s.split(sql);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn block_comment_semicolon_is_not_a_boundary() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let sql = "SELECT 1; /* a; fake; boundary */ SELECT 2;";
        let out = s.split(sql);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn nested_parens_do_not_confuse_depth_tracking() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let sql = "CREATE TABLE t (id INT CHECK (id > (0 + 1)));";
        let out = s.split(sql);
        assert_eq!(out.len(), 1);
    }

    /// §8 scenario 6: MySQL DELIMITER trigger framing.
    #[test]
    fn mysql_delimiter_trigger_is_one_statement() {
        let s = StatementSplitter::new(EngineKind::Mysql);
        let sql = "DELIMITER $$\nCREATE TRIGGER t BEFORE INSERT ON orders FOR EACH ROW BEGIN SET NEW.x = 1; END $$\nDELIMITER ;\n";
        let out = s.split(sql);
        assert_eq!(out.len(), 1, "{:?}", out);
        assert!(out[0].contains("SET NEW.x = 1;"));
    }

    #[test]
    fn bracketed_identifier_is_not_split_on_semicolon() {
        let s = StatementSplitter::new(EngineKind::Sqlite);
        let sql = "SELECT [my;col] FROM t;";
        let out = s.split(sql);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn joining_statements_reproduces_equivalent_input() {
        let s = StatementSplitter::new(EngineKind::Postgres);
        let sql = "SELECT 1; SELECT 2; SELECT 3;";
        let out = s.split(sql);
        assert_eq!(out.len(), 3);
        assert_eq!(out.join("; ") + ";", sql);
    }
}
