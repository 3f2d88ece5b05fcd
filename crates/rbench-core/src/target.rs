//! Dependency declarations attached to a build.
//!
//! On the wire a declaration is a JSON array whose first element is the
//! dependency name, optionally followed by either a version string or a
//! source object:
//!
//! ```text
//! ["sqlite3"]
//! ["activerecord", "3.2.8"]
//! ["rails", {"github": "rails/rails", "ref": "e54719df"}]
//! ["arel", {"git": "https://example.com/arel.git", "branch": "main"}]
//! ["local_gem", {"path": "../local_gem"}]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// `owner/repo` shorthand on GitHub.
    GitHub(String),
    Git(String),
    Path(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GitRef {
    Rev(String),
    Branch(String),
    Tag(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Declaration {
    /// Latest version compatible with the rest of the target.
    Named { name: String },
    Pinned { name: String, version: String },
    SourceRef {
        name: String,
        source: Source,
        reference: Option<GitRef>,
    },
}

pub type Target = Vec<Declaration>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("declaration must be a non-empty array, got {0}")]
    NotAnArray(String),
    #[error("declaration name must be a non-empty string")]
    MissingName,
    #[error("declaration for {name} has an unsupported qualifier: {detail}")]
    BadQualifier { name: String, detail: String },
    #[error("declaration for {name} has more than one qualifier")]
    TooManyQualifiers { name: String },
}

impl Declaration {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    pub fn pinned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Pinned {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn github(name: impl Into<String>, repo: impl Into<String>, rev: Option<&str>) -> Self {
        Self::SourceRef {
            name: name.into(),
            source: Source::GitHub(repo.into()),
            reference: rev.map(|r| GitRef::Rev(r.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Named { name } | Self::Pinned { name, .. } | Self::SourceRef { name, .. } => name,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, DeclarationError> {
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            other => return Err(DeclarationError::NotAnArray(other.to_string())),
        };

        let name = match &items[0] {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(DeclarationError::MissingName),
        };

        match &items[1..] {
            [] => Ok(Self::Named { name }),
            [Value::String(version)] => {
                if version.trim().is_empty() {
                    return Err(DeclarationError::BadQualifier {
                        name,
                        detail: "empty version".into(),
                    });
                }
                Ok(Self::Pinned {
                    name,
                    version: version.trim().to_string(),
                })
            }
            [Value::Object(opts)] => parse_source(name, opts),
            [other] => Err(DeclarationError::BadQualifier {
                name,
                detail: other.to_string(),
            }),
            _ => Err(DeclarationError::TooManyQualifiers { name }),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Named { name } => Value::Array(vec![Value::from(name.as_str())]),
            Self::Pinned { name, version } => {
                Value::Array(vec![Value::from(name.as_str()), Value::from(version.as_str())])
            }
            Self::SourceRef {
                name,
                source,
                reference,
            } => {
                let mut opts = Map::new();
                let (key, loc) = match source {
                    Source::GitHub(repo) => ("github", repo),
                    Source::Git(url) => ("git", url),
                    Source::Path(path) => ("path", path),
                };
                opts.insert(key.into(), Value::from(loc.as_str()));
                if let Some(r) = reference {
                    let (key, val) = match r {
                        GitRef::Rev(v) => ("ref", v),
                        GitRef::Branch(v) => ("branch", v),
                        GitRef::Tag(v) => ("tag", v),
                    };
                    opts.insert(key.into(), Value::from(val.as_str()));
                }
                Value::Array(vec![Value::from(name.as_str()), Value::Object(opts)])
            }
        }
    }
}

fn parse_source(name: String, opts: &Map<String, Value>) -> Result<Declaration, DeclarationError> {
    let mut source = None;
    let mut reference = None;

    for (key, val) in opts {
        let Some(s) = val.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(DeclarationError::BadQualifier {
                name,
                detail: format!("{key} must be a non-empty string"),
            });
        };
        let s = s.to_string();
        let slot_taken = match key.as_str() {
            "github" => source.replace(Source::GitHub(s)).is_some(),
            "git" => source.replace(Source::Git(s)).is_some(),
            "path" => source.replace(Source::Path(s)).is_some(),
            "ref" => reference.replace(GitRef::Rev(s)).is_some(),
            "branch" => reference.replace(GitRef::Branch(s)).is_some(),
            "tag" => reference.replace(GitRef::Tag(s)).is_some(),
            other => {
                return Err(DeclarationError::BadQualifier {
                    name,
                    detail: format!("unknown key {other}"),
                })
            }
        };
        if slot_taken {
            return Err(DeclarationError::TooManyQualifiers { name });
        }
    }

    let Some(source) = source else {
        return Err(DeclarationError::BadQualifier {
            name,
            detail: "source object needs one of github, git, path".into(),
        });
    };
    if matches!(source, Source::Path(_)) && reference.is_some() {
        return Err(DeclarationError::BadQualifier {
            name,
            detail: "path sources take no ref".into(),
        });
    }

    Ok(Declaration::SourceRef {
        name,
        source,
        reference,
    })
}

impl TryFrom<Value> for Declaration {
    type Error = DeclarationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<Declaration> for Value {
    fn from(decl: Declaration) -> Self {
        decl.to_value()
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Parse a whole target from its JSON text form, e.g. `[["sqlite3"], ["rails", "4.0.0"]]`.
pub fn parse_target(json: &str) -> anyhow::Result<Target> {
    let target: Target = serde_json::from_str(json)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_shape() {
        let t = parse_target(
            r#"[["sqlite3"], ["activerecord", "3.2.8"],
                ["rails", {"github": "rails/rails", "ref": "e54719df"}],
                ["arel", {"git": "https://example.com/arel.git", "branch": "main"}],
                ["local", {"path": "../local"}]]"#,
        )
        .unwrap();

        assert_eq!(t[0], Declaration::named("sqlite3"));
        assert_eq!(t[1], Declaration::pinned("activerecord", "3.2.8"));
        assert_eq!(t[2], Declaration::github("rails", "rails/rails", Some("e54719df")));
        assert_eq!(
            t[3],
            Declaration::SourceRef {
                name: "arel".into(),
                source: Source::Git("https://example.com/arel.git".into()),
                reference: Some(GitRef::Branch("main".into())),
            }
        );
        assert_eq!(t[4].name(), "local");
    }

    #[test]
    fn empty_target_is_valid() {
        assert!(parse_target("[]").unwrap().is_empty());
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let decl = Declaration::github("arel", "rails/arel", None);
        assert_eq!(serde_json::to_value(&decl).unwrap(), json!(["arel", {"github": "rails/arel"}]));
    }

    #[test]
    fn rejects_pin_and_source_together() {
        let err = Declaration::from_value(&json!(["rails", "4.0", {"github": "rails/rails"}])).unwrap_err();
        assert_eq!(err, DeclarationError::TooManyQualifiers { name: "rails".into() });
    }

    #[test]
    fn rejects_two_sources() {
        let err = Declaration::from_value(&json!(["rails", {"github": "rails/rails", "git": "x"}])).unwrap_err();
        assert_eq!(err, DeclarationError::TooManyQualifiers { name: "rails".into() });
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert!(matches!(
            Declaration::from_value(&json!("sqlite3")),
            Err(DeclarationError::NotAnArray(_))
        ));
        assert_eq!(Declaration::from_value(&json!([""])), Err(DeclarationError::MissingName));
        assert!(matches!(
            Declaration::from_value(&json!(["x", {"ref": "abc"}])),
            Err(DeclarationError::BadQualifier { .. })
        ));
        assert!(matches!(
            Declaration::from_value(&json!(["x", {"path": "p", "ref": "abc"}])),
            Err(DeclarationError::BadQualifier { .. })
        ));
        assert!(matches!(
            Declaration::from_value(&json!(["x", {"svn": "p"}])),
            Err(DeclarationError::BadQualifier { .. })
        ));
        assert!(matches!(
            Declaration::from_value(&json!(["x", 3])),
            Err(DeclarationError::BadQualifier { .. })
        ));
    }
}
