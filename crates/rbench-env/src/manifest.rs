use rbench_core::{Declaration, GitRef, Source};

/// Collapse declarations sharing a name: the entry stays where the name first
/// appeared and takes the content of its last declaration.
pub fn collapse(target: &[Declaration]) -> Vec<&Declaration> {
    let mut out: Vec<&Declaration> = Vec::with_capacity(target.len());
    for decl in target {
        match out.iter_mut().find(|d| d.name() == decl.name()) {
            Some(slot) => *slot = decl,
            None => out.push(decl),
        }
    }
    out
}

/// Render a Gemfile-style manifest for `target`.
///
/// An empty target yields a manifest with only the source line, which the
/// resolver accepts as "no extra dependencies".
pub fn render_manifest(source: Option<&str>, target: &[Declaration]) -> String {
    let mut out = String::from("# generated by rbench; do not edit\n");
    if let Some(src) = source {
        out.push_str(&format!("source {}\n", quote(src)));
    }
    let entries = collapse(target);
    if !entries.is_empty() {
        out.push('\n');
    }
    for decl in entries {
        out.push_str(&render_entry(decl));
        out.push('\n');
    }
    out
}

fn render_entry(decl: &Declaration) -> String {
    match decl {
        Declaration::Named { name } => format!("gem {}", quote(name)),
        Declaration::Pinned { name, version } => format!("gem {}, {}", quote(name), quote(version)),
        Declaration::SourceRef {
            name,
            source,
            reference,
        } => {
            let mut line = format!("gem {}", quote(name));
            let (key, loc) = match source {
                Source::GitHub(repo) => ("github", repo),
                Source::Git(url) => ("git", url),
                Source::Path(path) => ("path", path),
            };
            line.push_str(&format!(", {key}: {}", quote(loc)));
            if let Some(r) = reference {
                let (key, val) = match r {
                    GitRef::Rev(v) => ("ref", v),
                    GitRef::Branch(v) => ("branch", v),
                    GitRef::Tag(v) => ("tag", v),
                };
                line.push_str(&format!(", {key}: {}", quote(val)));
            }
            line
        }
    }
}

/// Double-quoted literal with no interpolation.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' | '"' | '#' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbench_core::parse_target;

    #[test]
    fn empty_target_renders_source_only() {
        let m = render_manifest(Some("https://rubygems.org"), &[]);
        assert_eq!(m, "# generated by rbench; do not edit\nsource \"https://rubygems.org\"\n");
    }

    #[test]
    fn renders_each_declaration_shape_in_order() {
        let target = parse_target(
            r#"[["sqlite3"], ["activerecord", "3.2.8"],
                ["arel", {"github": "rails/arel"}],
                ["rails", {"github": "rails/rails", "ref": "e54719df66f455c11a03a5cfa128025c8b00f141"}],
                ["rack", {"git": "https://example.com/rack.git", "tag": "v2.0.0"}],
                ["local", {"path": "../local"}]]"#,
        )
        .unwrap();
        let m = render_manifest(None, &target);
        let lines: Vec<&str> = m.lines().skip(2).collect();
        assert_eq!(
            lines,
            vec![
                r#"gem "sqlite3""#,
                r#"gem "activerecord", "3.2.8""#,
                r#"gem "arel", github: "rails/arel""#,
                r#"gem "rails", github: "rails/rails", ref: "e54719df66f455c11a03a5cfa128025c8b00f141""#,
                r#"gem "rack", git: "https://example.com/rack.git", tag: "v2.0.0""#,
                r#"gem "local", path: "../local""#,
            ]
        );
    }

    #[test]
    fn later_declaration_overrides_earlier_in_place() {
        let target = parse_target(r#"[["rails", "3.2.0"], ["sqlite3"], ["rails", "4.0.0"]]"#).unwrap();
        let names: Vec<String> = collapse(&target).iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec![r#"["rails","4.0.0"]"#, r#"["sqlite3"]"#]);
    }

    #[test]
    fn quoting_blocks_interpolation() {
        assert_eq!(quote(r#"a"b#{x}\"#), r#""a\"b\#{x}\\""#);
    }
}
