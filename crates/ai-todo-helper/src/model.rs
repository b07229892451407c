use std::fmt;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GoalId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(GoalId)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoalSummary {
    pub id: GoalId,
    pub title: String,
    #[serde(default)]
    pub completion: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoalDetail {
    pub id: GoalId,
    pub title: String,
    #[serde(default)]
    pub completion: f64,
    #[serde(default)]
    pub phases: Phases,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub title: String,
    pub tasks: Vec<Task>,
}

// Phase title -> tasks. Decoded entry by entry so server order survives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phases(pub Vec<Phase>);

impl Phases {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Phase> {
        self.0.iter()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.0.iter().flat_map(|p| p.tasks.iter())
    }
}

impl<'de> Deserialize<'de> for Phases {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PhasesVisitor;

        impl<'de> Visitor<'de> for PhasesVisitor {
            type Value = Phases;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of phase title to task list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Phases, A::Error> {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((title, tasks)) = map.next_entry::<String, Vec<Task>>()? {
                    out.push(Phase { title, tasks });
                }
                Ok(Phases(out))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Phases, E> {
                Ok(Phases::default())
            }
        }

        deserializer.deserialize_any(PhasesVisitor)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGoal {
    pub title: String,
    pub start_date: String,
}
