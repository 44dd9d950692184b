//! Path-query language over the state tree.
//!
//! Supported grammar:
//! - `$` root marker (mandatory, first character)
//! - `.name` property
//! - `['name']` / `["name"]` quoted property, for keys containing `.` or `[`
//! - `[3]` / `.3` numeric index
//! - `.*` / `[*]` single-level wildcard

use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path '{path}' must start with the root marker '$'")]
    MissingRoot { path: String },
    #[error("path '{path}': {reason} at offset {offset}")]
    Syntax {
        path: String,
        offset: usize,
        reason: String,
    },
}

/// One segment of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Key(String),
    Index(usize),
    Wildcard,
}

impl Step {
    pub fn is_index(&self) -> bool {
        matches!(self, Step::Index(_))
    }
}

/// A parsed path. The root marker is implicit: an empty step list is `$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonPath {
    steps: Vec<Step>,
}

/// A location found by [`JsonPath::select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a> {
    /// Concrete path of the location (never contains wildcards).
    pub path: JsonPath,
    pub value: &'a Value,
}

impl JsonPath {
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(Step::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.steps.push(Step::Index(index));
        self
    }

    pub fn wildcard(mut self) -> Self {
        self.steps.push(Step::Wildcard);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// True if the path contains no wildcard.
    pub fn is_concrete(&self) -> bool {
        !self.steps.iter().any(|s| matches!(s, Step::Wildcard))
    }

    /// True if any property segment equals `name`.
    pub fn touches(&self, name: &str) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, Step::Key(k) if k == name))
    }

    /// Parse a path string.
    pub fn parse(input: &str) -> Result<JsonPath, PathError> {
        let chars: Vec<char> = input.trim().chars().collect();
        if chars.first() != Some(&'$') {
            return Err(PathError::MissingRoot {
                path: input.to_string(),
            });
        }

        let syntax = |offset: usize, reason: &str| PathError::Syntax {
            path: input.to_string(),
            offset,
            reason: reason.to_string(),
        };

        let len = chars.len();
        let mut steps = Vec::new();
        let mut i = 1;

        while i < len {
            match chars[i] {
                '.' => {
                    let start = i + 1;
                    if start < len && chars[start] == '*' {
                        steps.push(Step::Wildcard);
                        i = start + 1;
                        continue;
                    }
                    let mut end = start;
                    while end < len && chars[end] != '.' && chars[end] != '[' {
                        if chars[end] == ']' || chars[end] == '\'' || chars[end] == '"' {
                            return Err(syntax(end, "unexpected character in property name"));
                        }
                        end += 1;
                    }
                    if end == start {
                        return Err(syntax(start, "empty property name"));
                    }
                    let name: String = chars[start..end].iter().collect();
                    steps.push(name_to_step(name));
                    i = end;
                }
                '[' => {
                    let start = i + 1;
                    match chars.get(start) {
                        Some('*') => {
                            if chars.get(start + 1) != Some(&']') {
                                return Err(syntax(start + 1, "expected ']' after wildcard"));
                            }
                            steps.push(Step::Wildcard);
                            i = start + 2;
                        }
                        Some(&quote) if quote == '\'' || quote == '"' => {
                            let mut name = String::new();
                            let mut end = start + 1;
                            let mut closed = false;
                            while end < len {
                                match chars[end] {
                                    '\\' if end + 1 < len => {
                                        name.push(chars[end + 1]);
                                        end += 2;
                                    }
                                    c if c == quote => {
                                        closed = true;
                                        break;
                                    }
                                    c => {
                                        name.push(c);
                                        end += 1;
                                    }
                                }
                            }
                            if !closed {
                                return Err(syntax(start, "unterminated quoted property"));
                            }
                            if chars.get(end + 1) != Some(&']') {
                                return Err(syntax(end + 1, "expected ']' after quoted property"));
                            }
                            steps.push(Step::Key(name));
                            i = end + 2;
                        }
                        Some(c) if c.is_ascii_digit() => {
                            let mut end = start;
                            while end < len && chars[end].is_ascii_digit() {
                                end += 1;
                            }
                            if chars.get(end) != Some(&']') {
                                return Err(syntax(end, "expected ']' after index"));
                            }
                            let digits: String = chars[start..end].iter().collect();
                            let index = digits
                                .parse::<usize>()
                                .map_err(|_| syntax(start, "index out of range"))?;
                            steps.push(Step::Index(index));
                            i = end + 1;
                        }
                        _ => return Err(syntax(start, "expected index, quoted name or '*'")),
                    }
                }
                _ => return Err(syntax(i, "expected '.' or '['")),
            }
        }

        Ok(JsonPath { steps })
    }

    /// RFC 6901 pointer for a concrete path, `None` if it has a wildcard.
    pub fn to_pointer(&self) -> Option<String> {
        let mut out = String::new();
        for step in &self.steps {
            out.push('/');
            match step {
                Step::Key(k) => out.push_str(&k.replace('~', "~0").replace('/', "~1")),
                Step::Index(i) => out.push_str(&i.to_string()),
                Step::Wildcard => return None,
            }
        }
        Some(out)
    }

    /// Every location in `root` this path matches, in document order.
    ///
    /// Missing keys, out-of-range indices and shape mismatches simply
    /// contribute nothing.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<Match<'a>> {
        let mut out = Vec::new();
        let mut trail = Vec::new();
        select_into(&self.steps, root, &mut trail, &mut out);
        out
    }
}

/// Purely numeric dotted names address array elements.
fn name_to_step(name: String) -> Step {
    if name.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(index) = name.parse::<usize>() {
            return Step::Index(index);
        }
    }
    Step::Key(name)
}

fn select_into<'a>(
    steps: &[Step],
    node: &'a Value,
    trail: &mut Vec<Step>,
    out: &mut Vec<Match<'a>>,
) {
    let Some((step, rest)) = steps.split_first() else {
        out.push(Match {
            path: JsonPath {
                steps: trail.clone(),
            },
            value: node,
        });
        return;
    };

    match (step, node) {
        (Step::Key(key), Value::Object(map)) => {
            if let Some(child) = map.get(key) {
                descend(Step::Key(key.clone()), rest, child, trail, out);
            }
        }
        (Step::Index(index), Value::Array(items)) => {
            if let Some(child) = items.get(*index) {
                descend(Step::Index(*index), rest, child, trail, out);
            }
        }
        (Step::Wildcard, Value::Object(map)) => {
            for (key, child) in map {
                descend(Step::Key(key.clone()), rest, child, trail, out);
            }
        }
        (Step::Wildcard, Value::Array(items)) => {
            for (index, child) in items.iter().enumerate() {
                descend(Step::Index(index), rest, child, trail, out);
            }
        }
        _ => {}
    }
}

fn descend<'a>(
    step: Step,
    rest: &[Step],
    child: &'a Value,
    trail: &mut Vec<Step>,
    out: &mut Vec<Match<'a>>,
) {
    trail.push(step);
    select_into(rest, child, trail, out);
    trail.pop();
}

fn is_plain_name(key: &str) -> bool {
    !key.is_empty()
        && key != "*"
        && !key.chars().all(|c| c.is_ascii_digit())
        && key
            .chars()
            .all(|c| !matches!(c, '.' | '[' | ']' | '\'' | '"' | '\\') && !c.is_whitespace())
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in &self.steps {
            match step {
                Step::Key(k) if is_plain_name(k) => write!(f, ".{}", k)?,
                Step::Key(k) => write!(f, "['{}']", k.replace('\\', "\\\\").replace('\'', "\\'"))?,
                Step::Index(i) => write!(f, "[{}]", i)?,
                Step::Wildcard => f.write_str(".*")?,
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for JsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JsonPath::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(path: &JsonPath) -> Vec<Step> {
        path.steps().to_vec()
    }

    #[test]
    fn parse_dotted_properties() {
        let path = JsonPath::parse("$.player.stats.str").unwrap();
        assert_eq!(
            keys(&path),
            vec![
                Step::Key("player".into()),
                Step::Key("stats".into()),
                Step::Key("str".into()),
            ]
        );
        assert!(path.is_concrete());
    }

    #[test]
    fn parse_indices_and_wildcards() {
        let path = JsonPath::parse("$.items[0].tags[*]").unwrap();
        assert_eq!(
            keys(&path),
            vec![
                Step::Key("items".into()),
                Step::Index(0),
                Step::Key("tags".into()),
                Step::Wildcard,
            ]
        );
        assert!(!path.is_concrete());

        let dotted = JsonPath::parse("$.items.2.*").unwrap();
        assert_eq!(
            keys(&dotted),
            vec![Step::Key("items".into()), Step::Index(2), Step::Wildcard]
        );
    }

    #[test]
    fn parse_quoted_names() {
        let path = JsonPath::parse("$['npc.guard']['it\\'s']").unwrap();
        assert_eq!(
            keys(&path),
            vec![Step::Key("npc.guard".into()), Step::Key("it's".into())]
        );
        let numeric_key = JsonPath::parse("$[\"0\"]").unwrap();
        assert_eq!(keys(&numeric_key), vec![Step::Key("0".into())]);
    }

    #[test]
    fn root_only() {
        let path = JsonPath::parse("$").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "$");
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            JsonPath::parse("player.hp"),
            Err(PathError::MissingRoot { .. })
        ));
        assert!(matches!(JsonPath::parse("$..hp"), Err(PathError::Syntax { .. })));
        assert!(matches!(JsonPath::parse("$.items[0"), Err(PathError::Syntax { .. })));
        assert!(matches!(JsonPath::parse("$.items[x]"), Err(PathError::Syntax { .. })));
        assert!(matches!(JsonPath::parse("$['open"), Err(PathError::Syntax { .. })));
        assert!(matches!(JsonPath::parse("$player"), Err(PathError::Syntax { .. })));
    }

    #[test]
    fn display_round_trips() {
        for input in ["$.player.stats", "$.items[3].name", "$['a.b'].c", "$.npcs.*.hp"] {
            let path = JsonPath::parse(input).unwrap();
            assert_eq!(JsonPath::parse(&path.to_string()).unwrap(), path);
        }
        assert_eq!(JsonPath::root().key("a.b").index(1).to_string(), "$['a.b'][1]");
    }

    #[test]
    fn pointer_escapes() {
        let path = JsonPath::root().key("a/b").key("c~d").index(2);
        assert_eq!(path.to_pointer().as_deref(), Some("/a~1b/c~0d/2"));
        assert_eq!(JsonPath::root().wildcard().to_pointer(), None);
        assert_eq!(JsonPath::root().to_pointer().as_deref(), Some(""));
    }

    #[test]
    fn touches_reserved_segment_anywhere() {
        assert!(JsonPath::parse("$._system.flags").unwrap().touches("_system"));
        assert!(JsonPath::parse("$.player._system").unwrap().touches("_system"));
        assert!(!JsonPath::parse("$.player.system").unwrap().touches("_system"));
    }

    #[test]
    fn select_fans_out_over_wildcards() {
        let tree = json!({
            "npcs": {
                "guard": { "hp": 5 },
                "smith": { "hp": 8 },
                "ghost": {}
            }
        });
        let path = JsonPath::parse("$.npcs.*.hp").unwrap();
        let found: Vec<_> = path.select(&tree).into_iter().map(|m| m.value.clone()).collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&json!(5)));
        assert!(found.contains(&json!(8)));
    }

    #[test]
    fn select_reports_concrete_paths() {
        let tree = json!({ "items": ["a", "b"] });
        let matches = JsonPath::parse("$.items[*]").unwrap().select(&tree);
        let paths: Vec<String> = matches.iter().map(|m| m.path.to_string()).collect();
        assert_eq!(paths, vec!["$.items[0]", "$.items[1]"]);
    }

    #[test]
    fn select_misses_are_empty() {
        let tree = json!({ "items": [1], "name": "x" });
        assert!(JsonPath::parse("$.items[4]").unwrap().select(&tree).is_empty());
        assert!(JsonPath::parse("$.name.first").unwrap().select(&tree).is_empty());
        assert!(JsonPath::parse("$.items.length").unwrap().select(&tree).is_empty());
        assert!(JsonPath::parse("$.missing.*").unwrap().select(&tree).is_empty());
    }
}
