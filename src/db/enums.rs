use serde::{Deserialize, Serialize};
use std::fmt;

/// How an agent's ping task selects its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PingTaskState {
    /// No ping task configured; the agent probes nothing.
    NoTask,
    /// At least one filter entry exists in any dimension.
    FilteredTask,
    /// A ping task without any filter; only probed-by-all targets apply.
    UnfilteredTask,
}

impl fmt::Display for PingTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One of the independent ways a ping task narrows its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDimension {
    Isp,
    Province,
    City,
    NameTag,
}

impl FilterDimension {
    pub const ALL: [FilterDimension; 4] = [
        FilterDimension::Isp,
        FilterDimension::Province,
        FilterDimension::City,
        FilterDimension::NameTag,
    ];
}

impl fmt::Display for FilterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterDimension::Isp => "isp",
            FilterDimension::Province => "province",
            FilterDimension::City => "city",
            FilterDimension::NameTag => "name_tag",
        };
        f.write_str(name)
    }
}
