use serde::Serialize;

use mswarm_core::types::{ConfigMap, WorkflowKind};

/// Source position of a node's first token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

/// Index of a swarm in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SwarmId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDefinition {
    pub span: Span,
    pub name: String,
    pub role: String,
    pub capabilities: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub config: ConfigMap,
    /// Nested swarm this agent is composed of, if any.
    pub body: Option<SwarmId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmDefinition {
    pub span: Span,
    pub name: String,
    pub agents: Vec<AgentDefinition>,
    /// Required at compile time; the parser tolerates its absence.
    pub workflow: Option<WorkflowDefinition>,
    pub config: ConfigMap,
}

impl SwarmDefinition {
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDefinition {
    pub span: Span,
    pub kind: WorkflowKind,
    /// The literal kind text from source when it was an identifier rather than a keyword.
    pub alias: Option<String>,
    pub steps: Vec<WorkflowStep>,
    /// Positional conditions, index-aligned with `steps`.
    pub conditions: Option<Vec<String>>,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStep {
    pub span: Span,
    /// Agent reference, resolved at execution time.
    pub agent_name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub transform: Option<String>,
    pub filter: Option<String>,
    pub timeout: Option<u64>,
    pub retry: Option<u32>,
    pub error_handler: Option<String>,
}

/// Parsed program: every swarm in the source, with the top-level one at `root`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ast {
    swarms: Vec<SwarmDefinition>,
    root: SwarmId,
}

impl Ast {
    pub(crate) fn new(swarms: Vec<SwarmDefinition>, root: SwarmId) -> Self {
        Self { swarms, root }
    }

    /// The top-level swarm.
    pub fn root(&self) -> &SwarmDefinition {
        &self.swarms[self.root.0]
    }

    pub fn root_id(&self) -> SwarmId {
        self.root
    }

    /// Look up a swarm by id. Ids handed out by the parser are always valid.
    pub fn swarm(&self, id: SwarmId) -> Option<&SwarmDefinition> {
        self.swarms.get(id.0)
    }

    /// All swarms, nested bodies before the swarms that contain them.
    pub fn swarms(&self) -> &[SwarmDefinition] {
        &self.swarms
    }

    /// Nesting depth below `id` (0 for a swarm without nested bodies).
    pub fn depth(&self, id: SwarmId) -> usize {
        self.swarm(id)
            .map(|s| {
                s.agents
                    .iter()
                    .filter_map(|a| a.body)
                    .map(|child| 1 + self.depth(child))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}
