use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a unit, unique within its [`UnitKind`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The four levels of the record hierarchy: JOB → SAMPLE → TEST → RESULT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Job,
    Sample,
    Test,
    Result,
}

impl UnitKind {
    /// The kind one level up, if any.
    pub fn parent(self) -> Option<UnitKind> {
        match self {
            UnitKind::Job => None,
            UnitKind::Sample => Some(UnitKind::Job),
            UnitKind::Test => Some(UnitKind::Sample),
            UnitKind::Result => Some(UnitKind::Test),
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Job => write!(f, "JOB"),
            UnitKind::Sample => write!(f, "SAMPLE"),
            UnitKind::Test => write!(f, "TEST"),
            UnitKind::Result => write!(f, "RESULT"),
        }
    }
}

/// A laboratory job; the unit whose billing status is rolled up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: UnitId,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub samples: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: UnitId,
    /// Back-reference to the owning job. Lookup only.
    #[serde(default)]
    pub job: Option<UnitId>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tests: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub id: UnitId,
    #[serde(default)]
    pub sample: Option<UnitId>,
    /// Analysis identity, exported as the test code.
    pub analysis: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub results: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: UnitId,
    #[serde(default)]
    pub test: Option<UnitId>,
    pub component: String,
    #[serde(default)]
    pub text: String,
}

/// Any node of the hierarchy, as returned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unit {
    Job(Job),
    Sample(Sample),
    Test(Test),
    Result(ResultRecord),
}

impl Unit {
    pub fn kind(&self) -> UnitKind {
        match self {
            Unit::Job(_) => UnitKind::Job,
            Unit::Sample(_) => UnitKind::Sample,
            Unit::Test(_) => UnitKind::Test,
            Unit::Result(_) => UnitKind::Result,
        }
    }

    pub fn id(&self) -> &UnitId {
        match self {
            Unit::Job(j) => &j.id,
            Unit::Sample(s) => &s.id,
            Unit::Test(t) => &t.id,
            Unit::Result(r) => &r.id,
        }
    }

    /// Weak reference to the containing unit. Always `None` for jobs.
    pub fn parent_ref(&self) -> Option<&UnitId> {
        match self {
            Unit::Job(_) => None,
            Unit::Sample(s) => s.job.as_ref(),
            Unit::Test(t) => t.sample.as_ref(),
            Unit::Result(r) => r.test.as_ref(),
        }
    }

    pub fn state(&self) -> Option<&str> {
        match self {
            Unit::Job(j) => j.state.as_deref(),
            Unit::Sample(s) => s.state.as_deref(),
            Unit::Test(t) => t.state.as_deref(),
            Unit::Result(_) => None,
        }
    }

    /// Sets the state of a stateful unit. Returns `false` for results.
    pub fn set_state(&mut self, state: String) -> bool {
        match self {
            Unit::Job(j) => j.state = Some(state),
            Unit::Sample(s) => s.state = Some(state),
            Unit::Test(t) => t.state = Some(state),
            Unit::Result(_) => return false,
        }
        true
    }

    /// Ordered child ids.
    pub fn children(&self) -> &[UnitId] {
        match self {
            Unit::Job(j) => &j.samples,
            Unit::Sample(s) => &s.tests,
            Unit::Test(t) => &t.results,
            Unit::Result(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<UnitId>> {
        match self {
            Unit::Job(j) => Some(&mut j.samples),
            Unit::Sample(s) => Some(&mut s.tests),
            Unit::Test(t) => Some(&mut t.results),
            Unit::Result(_) => None,
        }
    }

    /// Looks up a queryable field by name.
    ///
    /// The outer `Option` is `None` when the field does not exist on this kind;
    /// the inner one is `None` when the field exists but is null.
    pub fn field(&self, name: &str) -> Option<Option<&str>> {
        match name {
            "id" => Some(Some(self.id().as_str())),
            "parent" => match self {
                Unit::Job(_) => None,
                _ => Some(self.parent_ref().map(UnitId::as_str)),
            },
            "state" => match self {
                Unit::Result(_) => None,
                _ => Some(self.state()),
            },
            "analysis" => match self {
                Unit::Test(t) => Some(Some(t.analysis.as_str())),
                _ => None,
            },
            "component" => match self {
                Unit::Result(r) => Some(Some(r.component.as_str())),
                _ => None,
            },
            "text" => match self {
                Unit::Result(r) => Some(Some(r.text.as_str())),
                _ => None,
            },
            _ => None,
        }
    }
}
