use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// An ordered sequence of name steps addressing into a tree.
///
/// The empty path addresses the root. Equality is componentwise; the textual
/// form joins steps with `/` (so steps themselves may not contain `/`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path(Vec<String>);

impl Path {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from owned steps, validating each.
    pub fn from_steps<I, S>(steps: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps: Vec<String> = steps.into_iter().map(Into::into).collect();
        for step in &steps {
            validate_step(step)?;
        }
        Ok(Self(steps))
    }

    /// Parse from the `"a/b/c"` textual form. The empty string is the root.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        Self::from_steps(s.split('/'))
    }

    /// The steps of this path.
    pub fn steps(&self) -> &[String] {
        &self.0
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into the first step and the rest, or `None` at the root.
    pub fn split_first(&self) -> Option<(&str, Path)> {
        let (first, rest) = self.0.split_first()?;
        Some((first.as_str(), Path(rest.to_vec())))
    }

    /// A new path with `step` appended.
    pub fn child(&self, step: impl Into<String>) -> Result<Self, TypeError> {
        let step = step.into();
        validate_step(&step)?;
        let mut steps = self.0.clone();
        steps.push(step);
        Ok(Self(steps))
    }
}

fn validate_step(step: &str) -> Result<(), TypeError> {
    if step.is_empty() || step.contains('/') {
        return Err(TypeError::InvalidPathStep(step.to_string()));
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}
