//! Location expressions
//!
//! ```text
//! /A/B[2]/C    child steps, B is the second B among its element siblings
//! //C          C at any depth
//! /A//C[1]     first C below any depth under A
//! /            the document position itself
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    pub tag: String,
    /// 1-based position among same-named element siblings
    pub index: Option<usize>,
    /// Step may match at any depth below the previous one
    pub descendant: bool,
}

impl Step {
    pub fn child(tag: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            tag: tag.into(),
            index,
            descendant: false,
        }
    }

    pub fn descendant(tag: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            tag: tag.into(),
            index,
            descendant: true,
        }
    }

    /// Whether an element named `tag` at sibling position `position` matches
    pub fn matches(&self, tag: &str, position: usize) -> bool {
        self.tag == tag && self.index.map_or(true, |i| i == position)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    steps: Vec<Step>,
}

impl Location {
    /// The document position `/`
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn parse(input: &str) -> EngineResult<Self> {
        let invalid = |reason: &str| EngineError::InvalidLocation {
            location: input.to_string(),
            reason: reason.to_string(),
        };

        let rest = input
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let mut steps = Vec::new();
        let mut rest = rest;
        loop {
            let descendant = match rest.strip_prefix('/') {
                Some(r) => {
                    rest = r;
                    true
                }
                None => false,
            };

            let end = rest.find('/').unwrap_or(rest.len());
            let (text, tail) = rest.split_at(end);
            steps.push(parse_step(text, descendant).map_err(|reason| invalid(&reason))?);

            match tail.strip_prefix('/') {
                Some("") => return Err(invalid("trailing '/'")),
                Some(r) => rest = r,
                None => break,
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether this is the document position `/`
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Location of the `position`-th `tag` child below this one
    pub fn child(&self, tag: impl Into<String>, position: usize) -> Self {
        let mut next = self.clone();
        next.push(Step::child(tag, Some(position)));
        next
    }
}

fn parse_step(text: &str, descendant: bool) -> Result<Step, String> {
    if text.is_empty() {
        return Err("empty step".to_string());
    }

    let (tag, index) = match text.find('[') {
        Some(open) => {
            let inner = text[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated index in '{}'", text))?;
            let index: usize = inner
                .parse()
                .map_err(|_| format!("index '{}' is not a number", inner))?;
            if index == 0 {
                return Err("indices are 1-based".to_string());
            }
            (&text[..open], Some(index))
        }
        None => (text, None),
    };

    if tag.is_empty() {
        return Err(format!("missing tag name in '{}'", text));
    }
    if tag.contains(']') {
        return Err(format!("unexpected ']' in '{}'", text));
    }

    Ok(Step {
        tag: tag.to_string(),
        index,
        descendant,
    })
}

impl FromStr for Location {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("/");
        }
        for step in &self.steps {
            f.write_str(if step.descendant { "//" } else { "/" })?;
            f.write_str(&step.tag)?;
            if let Some(i) = step.index {
                write!(f, "[{}]", i)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_child_steps() {
        let loc = Location::parse("/a/b[2]/c").unwrap();
        assert_eq!(
            loc.steps(),
            &[
                Step::child("a", None),
                Step::child("b", Some(2)),
                Step::child("c", None)
            ]
        );
        assert_eq!(loc.to_string(), "/a/b[2]/c");
    }

    #[test]
    fn test_parse_descendant_steps() {
        let loc = Location::parse("//c").unwrap();
        assert_eq!(loc.steps(), &[Step::descendant("c", None)]);

        let loc = Location::parse("/a//c[1]").unwrap();
        assert_eq!(
            loc.steps(),
            &[Step::child("a", None), Step::descendant("c", Some(1))]
        );
        assert_eq!(loc.to_string(), "/a//c[1]");
    }

    #[test]
    fn test_root_location() {
        let loc = Location::parse("/").unwrap();
        assert!(loc.is_root());
        assert_eq!(loc.to_string(), "/");
    }

    #[test]
    fn test_malformed_locations() {
        for bad in ["", "a/b", "/a/", "///a", "/a[0]", "/a[x]", "/a[1", "/[1]", "/a]"] {
            let err = Location::parse(bad).unwrap_err();
            assert_eq!(err.code(), "XTREE_INVALID_LOCATION", "{}", bad);
        }
    }

    #[test]
    fn test_step_matching() {
        let step = Step::child("b", Some(2));
        assert!(step.matches("b", 2));
        assert!(!step.matches("b", 1));
        assert!(!step.matches("c", 2));
        assert!(Step::child("b", None).matches("b", 7));
    }

    #[test]
    fn test_child_builder() {
        let loc = Location::root().child("a", 1).child("b", 3);
        assert_eq!(loc.to_string(), "/a[1]/b[3]");
    }
}
