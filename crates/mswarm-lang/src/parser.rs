use tracing::{debug, warn};

use mswarm_core::error::{MswarmError, Result};
use mswarm_core::types::{ConfigMap, WorkflowKind};

use crate::ast::{AgentDefinition, Ast, Span, SwarmDefinition, SwarmId, WorkflowDefinition, WorkflowStep};
use crate::token::{Token, TokenKind};

/// Deepest chain of agent-bodied swarms the parser accepts, root included.
pub const MAX_SWARM_NESTING: usize = 64;

/// Recursive-descent parser over a token slice.
///
/// The grammar is tolerant: anything it does not recognize inside a
/// brace-delimited block is skipped, so model-authored source with stray or
/// reordered fields still parses. Structural tokens (`{`, `}`, names, field
/// values) are required and a mismatch aborts the whole parse. Workflow-level
/// `key: value` settings are the exception: an unsupported key is an error,
/// since its value would otherwise be read back as a step.
pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    eof: Token,
    swarms: Vec<SwarmDefinition>,
    nesting: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        let eof = match tokens.last() {
            Some(t) => Token::new(TokenKind::Eof, "", t.line, t.column),
            None => Token::new(TokenKind::Eof, "", 1, 1),
        };
        Self {
            tokens,
            pos: 0,
            eof,
            swarms: Vec::new(),
            nesting: 0,
        }
    }

    /// Parse exactly one top-level `swarm`.
    pub fn parse(mut self) -> Result<Ast> {
        let root = self.parse_swarm()?;
        if !self.check(TokenKind::Eof) {
            let extra = self.current();
            debug!(line = extra.line, token = %extra.kind, "Ignoring tokens after top-level swarm");
        }
        debug!(swarms = self.swarms.len(), "Parsed M program");
        Ok(Ast::new(self.swarms, root))
    }

    // ── Cursor ──────────────────────────────────────────────────

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn at_block_end(&self, close: TokenKind) -> bool {
        self.check(close) || self.check(TokenKind::Eof)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(kind.label()))
        }
    }

    /// Consume a `:` if present.
    fn skip_colon(&mut self) {
        if self.check(TokenKind::Colon) {
            self.advance();
        }
    }

    fn error(&self, expected: &str) -> MswarmError {
        let got = self.current();
        MswarmError::Parse {
            expected: expected.to_string(),
            got: got.kind.label().to_string(),
            line: got.line,
        }
    }

    fn span(token: &Token) -> Span {
        Span {
            line: token.line,
            column: token.column,
        }
    }

    // ── Grammar ─────────────────────────────────────────────────

    fn parse_swarm(&mut self) -> Result<SwarmId> {
        if self.nesting >= MAX_SWARM_NESTING {
            return Err(self.error(&format!("swarm nesting depth <= {}", MAX_SWARM_NESTING)));
        }
        self.nesting += 1;
        let id = self.parse_swarm_body();
        self.nesting -= 1;
        id
    }

    fn parse_swarm_body(&mut self) -> Result<SwarmId> {
        let start = self.expect(TokenKind::Swarm)?;
        let name = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::LBrace)?;

        let mut agents: Vec<AgentDefinition> = Vec::new();
        let mut workflow = None;
        let mut config = ConfigMap::new();

        while !self.at_block_end(TokenKind::RBrace) {
            match self.kind() {
                TokenKind::Agent => agents.push(self.parse_agent()?),
                TokenKind::Workflow => {
                    if workflow.is_some() {
                        warn!(swarm = %name, "Duplicate workflow block, keeping the last one");
                    }
                    workflow = Some(self.parse_workflow()?);
                }
                TokenKind::Config => {
                    self.advance();
                    self.skip_colon();
                    config.extend(self.parse_config()?);
                }
                TokenKind::Identifier => match self.peek(1).kind {
                    TokenKind::LBrace => {
                        self.advance();
                        config.extend(self.parse_config()?);
                    }
                    TokenKind::Colon => {
                        let key = self.advance().text;
                        self.advance();
                        if let Some(value) = self.parse_config_value() {
                            config.insert(key, value);
                        }
                    }
                    _ => {
                        self.advance();
                    }
                },
                _ => {
                    self.advance();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        let id = SwarmId(self.swarms.len());
        self.swarms.push(SwarmDefinition {
            span: Self::span(&start),
            name,
            agents,
            workflow,
            config,
        });
        Ok(id)
    }

    fn parse_agent(&mut self) -> Result<AgentDefinition> {
        let start = self.advance(); // 'agent'
        let name = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::LBrace)?;

        let mut role = String::new();
        let mut capabilities = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut config = ConfigMap::new();
        let mut body = None;

        while !self.at_block_end(TokenKind::RBrace) {
            match self.kind() {
                TokenKind::Role => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    role = self.expect(TokenKind::String)?.unquoted().to_string();
                }
                TokenKind::Capabilities => {
                    self.advance();
                    capabilities = self.parse_list_field()?;
                }
                TokenKind::Inputs => {
                    self.advance();
                    inputs = self.parse_list_field()?;
                }
                TokenKind::Outputs => {
                    self.advance();
                    outputs = self.parse_list_field()?;
                }
                TokenKind::Config => {
                    self.advance();
                    self.skip_colon();
                    config.extend(self.parse_config()?);
                }
                TokenKind::Swarm => body = Some(self.parse_swarm()?),
                _ => {
                    self.advance();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(AgentDefinition {
            span: Self::span(&start),
            name,
            role,
            capabilities,
            inputs,
            outputs,
            config,
            body,
        })
    }

    /// `: "a, b"` or `: ["a", "b"]`.
    fn parse_list_field(&mut self) -> Result<Vec<String>> {
        self.expect(TokenKind::Colon)?;
        if self.check(TokenKind::LBracket) {
            self.advance();
            let mut items = Vec::new();
            while !self.check(TokenKind::RBracket) {
                match self.kind() {
                    TokenKind::Eof => return Err(self.error(TokenKind::RBracket.label())),
                    TokenKind::String => items.extend(split_list(self.advance().unquoted())),
                    _ => {
                        self.advance();
                    }
                }
            }
            self.advance();
            Ok(items)
        } else {
            let token = self.expect(TokenKind::String)?;
            Ok(split_list(token.unquoted()))
        }
    }

    fn parse_workflow(&mut self) -> Result<WorkflowDefinition> {
        let start = self.advance(); // 'workflow'

        let mut alias = None;
        let kind = match self.kind() {
            TokenKind::Sequential => {
                self.advance();
                WorkflowKind::Sequential
            }
            TokenKind::Parallel => {
                self.advance();
                WorkflowKind::Parallel
            }
            TokenKind::Conditional => {
                self.advance();
                WorkflowKind::Conditional
            }
            TokenKind::Loop => {
                self.advance();
                WorkflowKind::Loop
            }
            TokenKind::Identifier => {
                let literal = self.advance().text;
                let kind = literal.parse().unwrap_or_else(|_| {
                    warn!(kind = %literal, "Unknown workflow type, defaulting to sequential");
                    WorkflowKind::Sequential
                });
                alias = Some(literal);
                kind
            }
            _ => WorkflowKind::Sequential,
        };

        self.expect(TokenKind::LBrace)?;

        let mut steps = Vec::new();
        let mut conditions = None;
        let mut max_iterations = None;

        while !self.at_block_end(TokenKind::RBrace) {
            match self.kind() {
                TokenKind::Identifier if self.peek(1).kind == TokenKind::Colon => {
                    if !self.current().text.eq_ignore_ascii_case("max_iterations") {
                        return Err(self.error("workflow setting max_iterations"));
                    }
                    self.advance();
                    self.advance();
                    max_iterations = Some(self.parse_u32()?);
                }
                TokenKind::Identifier => steps.push(self.parse_step()?),
                TokenKind::Conditional => {
                    self.advance();
                    self.skip_colon();
                    conditions = Some(self.parse_conditions()?);
                }
                TokenKind::Loop => {
                    self.advance();
                    self.skip_colon();
                    max_iterations = Some(self.parse_u32()?);
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(WorkflowDefinition {
            span: Self::span(&start),
            kind,
            alias,
            steps,
            conditions,
            max_iterations,
        })
    }

    fn parse_step(&mut self) -> Result<WorkflowStep> {
        let start = self.advance();
        let mut step = WorkflowStep {
            span: Self::span(&start),
            agent_name: start.text.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            transform: None,
            filter: None,
            timeout: None,
            retry: None,
            error_handler: None,
        };

        if !self.check(TokenKind::LParen) {
            return Ok(step);
        }
        self.advance();

        while !self.check(TokenKind::RParen) {
            match self.kind() {
                TokenKind::Eof => return Err(self.error(TokenKind::RParen.label())),
                TokenKind::Input | TokenKind::Inputs => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.inputs = split_list(self.expect(TokenKind::String)?.unquoted());
                }
                TokenKind::Output | TokenKind::Outputs => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.outputs = split_list(self.expect(TokenKind::String)?.unquoted());
                }
                TokenKind::Transform => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.transform = Some(self.expect(TokenKind::String)?.unquoted().to_string());
                }
                TokenKind::Filter => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.filter = Some(self.expect(TokenKind::String)?.unquoted().to_string());
                }
                TokenKind::Timeout => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.timeout = Some(self.parse_integer()?);
                }
                TokenKind::Retry => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.retry = Some(self.parse_u32()?);
                }
                TokenKind::Error => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    step.error_handler =
                        Some(self.expect(TokenKind::String)?.unquoted().to_string());
                }
                _ => {
                    self.advance();
                }
            }

            if self.check(TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(step)
    }

    /// `[ "key_a", "key_b" ]`
    fn parse_conditions(&mut self) -> Result<Vec<String>> {
        self.expect(TokenKind::LBracket)?;
        let mut conditions = Vec::new();

        while !self.check(TokenKind::RBracket) {
            match self.kind() {
                TokenKind::Eof => return Err(self.error(TokenKind::RBracket.label())),
                TokenKind::String => conditions.push(self.advance().unquoted().to_string()),
                TokenKind::Identifier => conditions.push(self.advance().text),
                _ => {
                    self.advance();
                }
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(conditions)
    }

    /// `{ model: "..." temperature: 0.7 key: value ... }`
    fn parse_config(&mut self) -> Result<ConfigMap> {
        self.expect(TokenKind::LBrace)?;
        let mut config = ConfigMap::new();

        while !self.at_block_end(TokenKind::RBrace) {
            let token = self.current().clone();
            match token.kind {
                TokenKind::Temperature => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    let number = self.expect(TokenKind::Number)?;
                    config.insert("temperature".into(), number_value(&number));
                }
                TokenKind::Model => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    let model = self.expect(TokenKind::String)?;
                    config.insert("model".into(), model.unquoted().into());
                }
                kind if (kind == TokenKind::Identifier || kind.is_keyword())
                    && self.peek(1).kind == TokenKind::Colon =>
                {
                    self.advance();
                    self.advance();
                    let key = if kind.is_keyword() {
                        token.text.to_ascii_lowercase()
                    } else {
                        token.text
                    };
                    if let Some(value) = self.parse_config_value() {
                        config.insert(key, value);
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(config)
    }

    /// A scalar value, if the current token is one. Non-scalars are left for
    /// the enclosing loop to skip.
    fn parse_config_value(&mut self) -> Option<serde_json::Value> {
        match self.kind() {
            TokenKind::String => Some(self.advance().unquoted().into()),
            TokenKind::Number => Some(number_value(&self.advance())),
            TokenKind::Boolean => Some(self.advance().text.eq_ignore_ascii_case("true").into()),
            _ => None,
        }
    }

    fn parse_integer(&mut self) -> Result<u64> {
        let token = self.expect(TokenKind::Number)?;
        token
            .text
            .parse::<u64>()
            .ok()
            .or_else(|| {
                token
                    .text
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| MswarmError::Parse {
                expected: "integer".into(),
                got: token.text.clone(),
                line: token.line,
            })
    }

    /// An integer literal that must fit in `u32` (retry counts, iteration bounds).
    fn parse_u32(&mut self) -> Result<u32> {
        let line = self.current().line;
        let value = self.parse_integer()?;
        u32::try_from(value).map_err(|_| MswarmError::Parse {
            expected: format!("integer <= {}", u32::MAX),
            got: value.to_string(),
            line,
        })
    }
}

/// Split a comma-separated literal, trimming each element and dropping empties.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Integral literals become JSON integers; everything else a float.
fn number_value(token: &Token) -> serde_json::Value {
    if let Ok(int) = token.text.parse::<i64>() {
        return int.into();
    }
    token
        .text
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Parse a token stream into an [`Ast`].
pub fn parse(tokens: &[Token]) -> Result<Ast> {
    Parser::new(tokens).parse()
}
