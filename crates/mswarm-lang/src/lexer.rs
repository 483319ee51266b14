use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use mswarm_core::error::{MswarmError, Result};

use crate::token::{Token, TokenKind};

/// A lexing rule. `kind == None` marks trivia (whitespace, comments) that is
/// recognized and dropped.
struct Rule {
    kind: Option<TokenKind>,
    regex: Regex,
}

/// Rules in priority order; the first rule matching at the cursor wins.
/// Keywords precede the identifier rule and multi-character operators precede
/// their single-character prefixes.
const RULES: &[(Option<TokenKind>, &str)] = &[
    // Trivia
    (None, r"\s+"),
    (None, r"//[^\n]*"),
    (None, r"/\*(?s:.*?)\*/"),
    // Keywords
    (Some(TokenKind::Agent), r"agent\b"),
    (Some(TokenKind::Swarm), r"swarm\b"),
    (Some(TokenKind::Workflow), r"workflow\b"),
    (Some(TokenKind::Parallel), r"parallel\b"),
    (Some(TokenKind::Sequential), r"sequential\b"),
    (Some(TokenKind::Conditional), r"conditional\b"),
    (Some(TokenKind::Loop), r"loop\b"),
    (Some(TokenKind::Role), r"role\b"),
    (Some(TokenKind::Input), r"input\b"),
    (Some(TokenKind::Output), r"output\b"),
    (Some(TokenKind::Transform), r"transform\b"),
    (Some(TokenKind::Filter), r"filter\b"),
    (Some(TokenKind::Merge), r"merge\b"),
    (Some(TokenKind::Split), r"split\b"),
    (Some(TokenKind::Wait), r"wait\b"),
    (Some(TokenKind::Timeout), r"timeout\b"),
    (Some(TokenKind::Retry), r"retry\b"),
    (Some(TokenKind::Error), r"error\b"),
    (Some(TokenKind::Success), r"success\b"),
    (Some(TokenKind::Failure), r"failure\b"),
    (Some(TokenKind::Capabilities), r"capabilities\b"),
    (Some(TokenKind::Inputs), r"inputs\b"),
    (Some(TokenKind::Outputs), r"outputs\b"),
    (Some(TokenKind::Config), r"config\b"),
    (Some(TokenKind::Model), r"model\b"),
    (Some(TokenKind::Temperature), r"temperature\b"),
    // Literals
    (Some(TokenKind::Boolean), r"(?:true|false)\b"),
    (Some(TokenKind::Number), r"\d+\.?\d*"),
    (Some(TokenKind::String), r#""[^"]*"|'[^']*'"#),
    // Operators
    (Some(TokenKind::Equals), r"=="),
    (Some(TokenKind::NotEquals), r"!="),
    (Some(TokenKind::GreaterEqual), r">="),
    (Some(TokenKind::LessEqual), r"<="),
    (Some(TokenKind::And), r"&&"),
    (Some(TokenKind::Or), r"\|\|"),
    (Some(TokenKind::Arrow), r"->"),
    (Some(TokenKind::Assign), r"="),
    (Some(TokenKind::Greater), r">"),
    (Some(TokenKind::Less), r"<"),
    (Some(TokenKind::Not), r"!"),
    (Some(TokenKind::Pipe), r"\|"),
    // Delimiters
    (Some(TokenKind::LParen), r"\("),
    (Some(TokenKind::RParen), r"\)"),
    (Some(TokenKind::LBrace), r"\{"),
    (Some(TokenKind::RBrace), r"\}"),
    (Some(TokenKind::LBracket), r"\["),
    (Some(TokenKind::RBracket), r"\]"),
    (Some(TokenKind::Semicolon), r";"),
    (Some(TokenKind::Comma), r","),
    (Some(TokenKind::Dot), r"\."),
    (Some(TokenKind::Colon), r":"),
    // Identifiers
    (Some(TokenKind::Identifier), r"[a-zA-Z_][a-zA-Z0-9_]*"),
];

fn compiled_rules() -> &'static [Rule] {
    static COMPILED: OnceLock<Vec<Rule>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(kind, pattern)| Rule {
                kind: *kind,
                // Patterns are static and covered by tests.
                regex: Regex::new(&format!("(?i)^(?:{})", pattern))
                    .unwrap_or_else(|e| panic!("invalid lexer rule {}: {}", pattern, e)),
            })
            .collect()
    })
}

/// Single-pass, rule-table tokenizer for M source.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize `source`. Always ends with an `Eof` token; the first
    /// unrecognized character aborts the whole call.
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>> {
        let rules = compiled_rules();
        let mut tokens = Vec::new();
        let mut pos = 0usize;
        let mut line = 1usize;
        let mut column = 1usize;

        while pos < source.len() {
            let rest = &source[pos..];
            let matched = rules.iter().find_map(|rule| {
                rule.regex
                    .find(rest)
                    .filter(|m| !m.as_str().is_empty())
                    .map(|m| (rule.kind, m.as_str()))
            });

            let Some((kind, text)) = matched else {
                let ch = rest.chars().next().unwrap_or('\0');
                return Err(MswarmError::Lex { line, column, ch });
            };

            if let Some(kind) = kind {
                tokens.push(Token::new(kind, text, line, column));
            }

            pos += text.len();
            match text.rfind('\n') {
                Some(idx) => {
                    line += text.matches('\n').count();
                    column = text[idx + 1..].chars().count() + 1;
                }
                None => column += text.chars().count(),
            }
        }

        tokens.push(Token::new(TokenKind::Eof, "", line, column));
        debug!(count = tokens.len(), "Tokenized M source");
        Ok(tokens)
    }

    /// Tokenize a file on disk.
    pub fn tokenize_file(&self, path: &Path) -> Result<Vec<Token>> {
        let source = std::fs::read_to_string(path)?;
        self.tokenize(&source)
    }
}

/// Tokenize `source` with the default rule table.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new().tokenize(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = tokenize("swarm research_swarm { agent writer {} }").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Swarm,
                TokenKind::Identifier,
                TokenKind::LBrace,
                TokenKind::Agent,
                TokenKind::Identifier,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].text, "research_swarm");
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        // `agents` and `agent_x` are identifiers, not the `agent` keyword.
        assert_eq!(
            kinds("agents agent_x"),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
        // `inputs` must not lex as `input` + `s`.
        assert_eq!(kinds("inputs"), vec![TokenKind::Inputs, TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let tokens = tokenize("SWARM Workflow PARALLEL").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Swarm);
        assert_eq!(tokens[1].kind, TokenKind::Workflow);
        assert_eq!(tokens[2].kind, TokenKind::Parallel);
        assert_eq!(tokens[0].text, "SWARM");
    }

    #[test]
    fn test_multi_char_operators_win() {
        assert_eq!(
            kinds("== != >= <= && || -> = > < ! |"),
            vec![
                TokenKind::Equals,
                TokenKind::NotEquals,
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Arrow,
                TokenKind::Assign,
                TokenKind::Greater,
                TokenKind::Less,
                TokenKind::Not,
                TokenKind::Pipe,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal_keeps_quotes() {
        let tokens = tokenize(r#"role: "Test agent""#).unwrap();
        let string = tokens.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(string.text, "\"Test agent\"");
        assert_eq!(string.unquoted(), "Test agent");

        let single = tokenize("'single'").unwrap();
        assert_eq!(single[0].unquoted(), "single");
    }

    #[test]
    fn test_numbers_and_booleans() {
        let tokens = tokenize("temperature: 0.7 retry: 3 flag: TRUE").unwrap();
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(numbers, vec!["0.7", "3"]);
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Boolean && t.text == "TRUE"));
    }

    #[test]
    fn test_comments_are_discarded() {
        let source = "// line comment\nswarm /* block\nspanning lines */ s";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Swarm);
        assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!((tokens[1].line, tokens[1].column), (3, 19));
    }

    #[test]
    fn test_positions_track_lines_and_columns() {
        let tokens = tokenize("swarm s {\n  agent a {}\n}").unwrap();
        let agent = tokens.iter().find(|t| t.kind == TokenKind::Agent).unwrap();
        assert_eq!((agent.line, agent.column), (2, 3));
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!((eof.line, eof.column), (3, 2));
    }

    #[test]
    fn test_empty_source_yields_only_eof() {
        let tokens = tokenize("").unwrap();
        assert_eq!(tokens, vec![Token::new(TokenKind::Eof, "", 1, 1)]);
    }

    #[test]
    fn test_unknown_character_is_fatal() {
        let err = tokenize("swarm s {\n  @\n}").unwrap_err();
        match err {
            MswarmError::Lex { line, column, ch } => {
                assert_eq!((line, column, ch), (2, 3, '@'));
            }
            other => panic!("expected lex error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_block_comment_is_fatal() {
        assert!(matches!(
            tokenize("swarm /* never closed"),
            Err(MswarmError::Lex { ch: '/', .. })
        ));
    }

    #[test]
    fn test_tokenize_is_deterministic() {
        let source = "swarm s { agent a { role: \"r\" } workflow loop { a() loop 3 } }";
        assert_eq!(tokenize(source).unwrap(), tokenize(source).unwrap());
    }
}
