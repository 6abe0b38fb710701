use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A remote-executable script plus the visualization that renders its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub vis: VisSpec,
}

/// Declares the arguments a script accepts and the functions whose output it displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisSpec {
    #[serde(default)]
    pub variables: Vec<VisVariable>,
    #[serde(default)]
    pub global_funcs: Vec<GlobalFunc>,
    #[serde(default)]
    pub widgets: Vec<Widget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisVariable {
    pub name: String,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub valid_values: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalFunc {
    pub output_name: String,
    pub func: Func,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub func: Option<Func>,
    #[serde(default)]
    pub global_func_output_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Func {
    pub name: String,
    #[serde(default)]
    pub args: Vec<FuncArg>,
}

/// A function argument is either a literal value or a reference to a vis variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncArg {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub variable: Option<String>,
}

/// A single argument value: scalar or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Single(String),
    List(Vec<String>),
}

impl ArgValue {
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            ArgValue::Single(v) => vec![v.as_str()],
            ArgValue::List(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Single(v) => f.write_str(v),
            ArgValue::List(vs) => f.write_str(&vs.join(",")),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Single(v.to_string())
    }
}

pub type Arguments = BTreeMap<String, ArgValue>;

/// Function call sent alongside the script so the server knows which outputs to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFunction {
    pub output_table_prefix: String,
    pub func_name: String,
    pub args: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Embedding options mirrored into the route; `widget` restricts execution to one widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedState {
    #[serde(default)]
    pub is_embedded: bool,
    #[serde(default)]
    pub widget: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    pub enable_e2e_encryption: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
}

/// A named result table. Rows only ever grow within one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub relation: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
    #[serde(default)]
    pub batch_count: usize,
}

impl Table {
    pub fn new(id: impl Into<String>, name: impl Into<String>, relation: Vec<Column>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            relation,
            rows: Vec::new(),
            batch_count: 0,
        }
    }

    pub fn append_batch(&mut self, batch: RowBatch) {
        self.rows.extend(batch.rows);
        self.batch_count += 1;
    }
}

/// One incoming batch for a named table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub relation: Vec<Column>,
    pub batch: RowBatch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    #[serde(default)]
    pub records_processed: u64,
    #[serde(default)]
    pub bytes_processed: u64,
    #[serde(default)]
    pub execution_time_ns: u64,
    #[serde(default)]
    pub compilation_time_ns: u64,
}

/// gRPC status codes the server reports in mutation info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    Internal,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationStatus {
    pub code: StatusCode,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationInfo {
    pub status: MutationStatus,
    #[serde(default)]
    pub states: Vec<serde_json::Value>,
}

impl MutationInfo {
    pub fn is_unavailable(&self) -> bool {
        self.status.code == StatusCode::Unavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    Script,
    Vis,
    Execution,
    Server,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryError {
    pub message: String,
    #[serde(default)]
    pub kind: Option<QueryErrorKind>,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }

    /// Generic or server-side failures are the ones worth offering a one-click retry for.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, None | Some(QueryErrorKind::Server))
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind:?} error: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Results attached to every execution update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResults {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub execution_stats: Option<ExecutionStats>,
    #[serde(default)]
    pub mutation_info: Option<MutationInfo>,
}

/// Closed set of lifecycle events emitted by one remote execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    Start,
    Metadata,
    Data { data: Vec<BatchUpdate> },
    Stats,
    MutationInfo,
    Status,
    Error { errors: Vec<QueryError> },
    Cancel,
}

impl ExecutionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::Start => "start",
            ExecutionEvent::Metadata => "metadata",
            ExecutionEvent::Data { .. } => "data",
            ExecutionEvent::Stats => "stats",
            ExecutionEvent::MutationInfo => "mutation-info",
            ExecutionEvent::Status => "status",
            ExecutionEvent::Error { .. } => "error",
            ExecutionEvent::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub event: ExecutionEvent,
    #[serde(default)]
    pub results: ExecutionResults,
}

impl ExecutionUpdate {
    pub fn new(event: ExecutionEvent) -> Self {
        Self {
            event,
            results: ExecutionResults::default(),
        }
    }

    pub fn with_results(mut self, results: ExecutionResults) -> Self {
        self.results = results;
        self
    }
}
