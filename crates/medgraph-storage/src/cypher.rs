//! Read-query subset understood by [`crate::MemoryStore`].
//!
//! Covers the shapes the QA exemplars produce:
//!
//! ```text
//! MATCH (d:Disease {name: '糖尿病'})-[:HAS_SYMPTOM]->(s:Symptom)
//! WHERE d.name CONTAINS '糖尿' AND s.name = '多饮'
//! RETURN DISTINCT s.name AS symptom
//! LIMIT 20
//! ```
//!
//! Single-node patterns, `<-` and undirected relationships, and
//! `STARTS WITH` / `ENDS WITH` are accepted too. Anything else is
//! [`StoreError::Unsupported`].

use crate::StoreError;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodePattern {
    pub var: Option<String>,
    pub label: Option<String>,
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Outgoing,
    Incoming,
    Either,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pattern {
    Node(NodePattern),
    Path {
        left: NodePattern,
        rel_type: Option<String>,
        direction: Direction,
        right: NodePattern,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

impl Op {
    pub fn holds(self, actual: &str, expected: &str) -> bool {
        match self {
            Op::Equals => actual == expected,
            Op::Contains => actual.contains(expected),
            Op::StartsWith => actual.starts_with(expected),
            Op::EndsWith => actual.ends_with(expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Condition {
    pub var: String,
    pub property: String,
    pub op: Op,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Projection {
    pub var: String,
    /// `None` projects the whole node.
    pub property: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReadQuery {
    pub pattern: Pattern,
    pub conditions: Vec<Condition>,
    pub distinct: bool,
    pub projections: Vec<Projection>,
    pub limit: Option<usize>,
}

fn regex(pattern: &str) -> Result<Regex, StoreError> {
    Regex::new(pattern).map_err(|e| StoreError::Runtime(format!("bad query regex: {e}")))
}

fn unsupported(statement: &str) -> StoreError {
    StoreError::Unsupported(statement.to_string())
}

pub(crate) fn parse(statement: &str) -> Result<ReadQuery, StoreError> {
    let text = statement.trim().trim_end_matches(';').trim();

    let top = regex(
        r"(?is)^MATCH\s+(?P<pattern>.+?)\s+(?:WHERE\s+(?P<where>.+?)\s+)?RETURN\s+(?P<distinct>DISTINCT\s+)?(?P<ret>.+?)(?:\s+LIMIT\s+(?P<limit>\d+))?$",
    )?;
    let caps = top.captures(text).ok_or_else(|| unsupported(text))?;

    let pattern = parse_pattern(caps["pattern"].trim(), text)?;

    let mut conditions = Vec::new();
    if let Some(clause) = caps.name("where") {
        let and = regex(r"(?i)\s+AND\s+")?;
        for part in and.split(clause.as_str().trim()) {
            conditions.push(parse_condition(part.trim(), text)?);
        }
    }

    let mut projections = Vec::new();
    for item in caps["ret"].split(',') {
        projections.push(parse_projection(item.trim(), text)?);
    }

    let limit = match caps.name("limit") {
        Some(m) => Some(m.as_str().parse::<usize>().map_err(|_| unsupported(text))?),
        None => None,
    };

    Ok(ReadQuery {
        pattern,
        conditions,
        distinct: caps.name("distinct").is_some(),
        projections,
        limit,
    })
}

fn parse_pattern(text: &str, statement: &str) -> Result<Pattern, StoreError> {
    if let Some(node) = parse_node(text)? {
        return Ok(Pattern::Node(node));
    }

    let path = regex(
        r"(?s)^(?P<left>\([^()]*\))\s*(?P<lt><)?-\s*\[\s*(?P<rvar>\w+)?\s*(?::\s*(?P<rel>\w+))?\s*\]\s*-(?P<gt>>)?\s*(?P<right>\([^()]*\))$",
    )?;
    let caps = path.captures(text).ok_or_else(|| unsupported(statement))?;

    let direction = match (caps.name("lt").is_some(), caps.name("gt").is_some()) {
        (false, true) => Direction::Outgoing,
        (true, false) => Direction::Incoming,
        (false, false) => Direction::Either,
        (true, true) => return Err(unsupported(statement)),
    };

    let left = parse_node(&caps["left"])?.ok_or_else(|| unsupported(statement))?;
    let right = parse_node(&caps["right"])?.ok_or_else(|| unsupported(statement))?;

    Ok(Pattern::Path {
        left,
        rel_type: caps.name("rel").map(|m| m.as_str().to_string()),
        direction,
        right,
    })
}

fn parse_node(text: &str) -> Result<Option<NodePattern>, StoreError> {
    let node = regex(
        r"(?s)^\(\s*(?P<var>\w+)?\s*(?::\s*(?P<label>\w+))?\s*(?:\{(?P<props>[^}]*)\})?\s*\)$",
    )?;
    let Some(caps) = node.captures(text.trim()) else {
        return Ok(None);
    };

    let mut properties = Vec::new();
    if let Some(props) = caps.name("props") {
        let pair = regex(r#"(?P<key>\w+)\s*:\s*(?:'(?P<sq>[^']*)'|"(?P<dq>[^"]*)")"#)?;
        for p in pair.captures_iter(props.as_str()) {
            let value = p
                .name("sq")
                .or_else(|| p.name("dq"))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            properties.push((p["key"].to_string(), value));
        }
    }

    Ok(Some(NodePattern {
        var: caps.name("var").map(|m| m.as_str().to_string()),
        label: caps.name("label").map(|m| m.as_str().to_string()),
        properties,
    }))
}

fn parse_condition(text: &str, statement: &str) -> Result<Condition, StoreError> {
    let cond = regex(
        r#"(?is)^(?P<var>\w+)\.(?P<prop>\w+)\s*(?P<op>=|CONTAINS|STARTS\s+WITH|ENDS\s+WITH)\s*(?:'(?P<sq>[^']*)'|"(?P<dq>[^"]*)")$"#,
    )?;
    let caps = cond.captures(text).ok_or_else(|| unsupported(statement))?;

    let op_text = caps["op"].to_ascii_uppercase();
    let op = if op_text == "=" {
        Op::Equals
    } else if op_text == "CONTAINS" {
        Op::Contains
    } else if op_text.starts_with("STARTS") {
        Op::StartsWith
    } else {
        Op::EndsWith
    };

    let value = caps
        .name("sq")
        .or_else(|| caps.name("dq"))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Ok(Condition {
        var: caps["var"].to_string(),
        property: caps["prop"].to_string(),
        op,
        value,
    })
}

fn parse_projection(text: &str, statement: &str) -> Result<Projection, StoreError> {
    let proj = regex(r"(?is)^(?P<var>\w+)(?:\.(?P<prop>\w+))?(?:\s+AS\s+(?P<alias>\w+))?$")?;
    let caps = proj.captures(text).ok_or_else(|| unsupported(statement))?;

    let var = caps["var"].to_string();
    let property = caps.name("prop").map(|m| m.as_str().to_string());
    let column = match (caps.name("alias"), &property) {
        (Some(alias), _) => alias.as_str().to_string(),
        (None, Some(prop)) => format!("{var}.{prop}"),
        (None, None) => var.clone(),
    };

    Ok(Projection {
        var,
        property,
        column,
    })
}
