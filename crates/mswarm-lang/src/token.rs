use std::fmt;

use serde::Serialize;

/// Token kinds of the M language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    // Keywords
    Agent,
    Swarm,
    Workflow,
    Parallel,
    Sequential,
    Conditional,
    Loop,
    Role,
    Input,
    Output,
    Transform,
    Filter,
    Merge,
    Split,
    Wait,
    Timeout,
    Retry,
    Error,
    Success,
    Failure,
    Capabilities,
    Inputs,
    Outputs,
    Config,
    Model,
    Temperature,

    // Literals
    String,
    Number,
    Boolean,

    // Operators
    Equals,
    NotEquals,
    GreaterEqual,
    LessEqual,
    And,
    Or,
    Arrow,
    Assign,
    Greater,
    Less,
    Not,
    Pipe,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Colon,

    Identifier,
    Eof,
}

impl TokenKind {
    /// Upper-case label used in diagnostics (`Expected LBRACE, got IDENTIFIER`).
    pub fn label(&self) -> &'static str {
        match self {
            TokenKind::Agent => "AGENT",
            TokenKind::Swarm => "SWARM",
            TokenKind::Workflow => "WORKFLOW",
            TokenKind::Parallel => "PARALLEL",
            TokenKind::Sequential => "SEQUENTIAL",
            TokenKind::Conditional => "CONDITIONAL",
            TokenKind::Loop => "LOOP",
            TokenKind::Role => "ROLE",
            TokenKind::Input => "INPUT",
            TokenKind::Output => "OUTPUT",
            TokenKind::Transform => "TRANSFORM",
            TokenKind::Filter => "FILTER",
            TokenKind::Merge => "MERGE",
            TokenKind::Split => "SPLIT",
            TokenKind::Wait => "WAIT",
            TokenKind::Timeout => "TIMEOUT",
            TokenKind::Retry => "RETRY",
            TokenKind::Error => "ERROR",
            TokenKind::Success => "SUCCESS",
            TokenKind::Failure => "FAILURE",
            TokenKind::Capabilities => "CAPABILITIES",
            TokenKind::Inputs => "INPUTS",
            TokenKind::Outputs => "OUTPUTS",
            TokenKind::Config => "CONFIG",
            TokenKind::Model => "MODEL",
            TokenKind::Temperature => "TEMPERATURE",
            TokenKind::String => "STRING",
            TokenKind::Number => "NUMBER",
            TokenKind::Boolean => "BOOLEAN",
            TokenKind::Equals => "EQUALS",
            TokenKind::NotEquals => "NOT_EQUALS",
            TokenKind::GreaterEqual => "GREATER_EQUAL",
            TokenKind::LessEqual => "LESS_EQUAL",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Arrow => "ARROW",
            TokenKind::Assign => "ASSIGN",
            TokenKind::Greater => "GREATER",
            TokenKind::Less => "LESS",
            TokenKind::Not => "NOT",
            TokenKind::Pipe => "PIPE",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Comma => "COMMA",
            TokenKind::Dot => "DOT",
            TokenKind::Colon => "COLON",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Eof => "EOF",
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Agent
                | TokenKind::Swarm
                | TokenKind::Workflow
                | TokenKind::Parallel
                | TokenKind::Sequential
                | TokenKind::Conditional
                | TokenKind::Loop
                | TokenKind::Role
                | TokenKind::Input
                | TokenKind::Output
                | TokenKind::Transform
                | TokenKind::Filter
                | TokenKind::Merge
                | TokenKind::Split
                | TokenKind::Wait
                | TokenKind::Timeout
                | TokenKind::Retry
                | TokenKind::Error
                | TokenKind::Success
                | TokenKind::Failure
                | TokenKind::Capabilities
                | TokenKind::Inputs
                | TokenKind::Outputs
                | TokenKind::Config
                | TokenKind::Model
                | TokenKind::Temperature
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A lexed token. `text` is the exact source slice (string literals keep their quotes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    /// String literal contents without the surrounding quotes.
    pub fn unquoted(&self) -> &str {
        let t = self.text.as_str();
        if t.len() >= 2
            && ((t.starts_with('"') && t.ends_with('"'))
                || (t.starts_with('\'') && t.ends_with('\'')))
        {
            &t[1..t.len() - 1]
        } else {
            t
        }
    }
}
