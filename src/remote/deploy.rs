//! Content changes pushed through an app's git checkout.
//!
//! Edits are applied to the checkout in-process with typed parameters; only
//! `git` itself is spawned, always with an explicit argv.
use anyhow::{anyhow, Context, Result};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker the platform's stock index pages carry for submodule substitution.
const SUBMODULE_PLACEHOLDER: &str = "OpenShift";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployChange {
    /// Replace the first `from` on each line of the index file with `to`.
    Replace { from: String, to: String },
    /// Copy `source` over the index file, then substitute every param key with its value.
    Template {
        source: PathBuf,
        params: BTreeMap<String, String>,
    },
    /// Add `repo` as a submodule and splice its `index` contents into the index file.
    Submodule { repo: PathBuf },
}

impl DeployChange {
    pub fn commit_message(&self) -> &'static str {
        match self {
            DeployChange::Replace { .. } | DeployChange::Template { .. } => "Test change",
            DeployChange::Submodule { .. } => "Test submodule change",
        }
    }

    pub fn log_step(&self) -> &'static str {
        match self {
            DeployChange::Replace { .. } => "git_push",
            DeployChange::Template { .. } => "git_push_template",
            DeployChange::Submodule { .. } => "git_push_submodule",
        }
    }
}

/// Index file served at `/` for a given cartridge type, relative to the checkout.
pub fn index_file(app_type: &str) -> &'static str {
    let family = app_type.split('-').next().unwrap_or(app_type);
    match family {
        "php" => "php/index.php",
        "perl" => "perl/index.pl",
        "python" => "wsgi/application",
        "ruby" | "rack" => "config.ru",
        "nodejs" => "index.html",
        "jbossas" | "jbosseap" | "jbossews" => "src/main/webapp/index.html",
        "diy" => "diy/index.html",
        "zend" => "php/index.php",
        _ => "index.html",
    }
}

/// Substitute the first occurrence of `from` on every line, like `sed s/from/to/`.
pub(super) fn replace_first_per_line(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        match line.find(from) {
            Some(idx) => {
                out.push_str(&line[..idx]);
                out.push_str(to);
                out.push_str(&line[idx + from.len()..]);
            }
            None => out.push_str(line),
        }
    }
    out
}

/// Replace the first occurrence of every param key on each line in one pass
/// over the original text, so substituted values are never rescanned.
pub(super) fn apply_params(text: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let mut hits: Vec<(usize, &str, &str)> = params
            .iter()
            .filter(|(key, _)| !key.is_empty())
            .filter_map(|(key, value)| {
                line.find(key.as_str())
                    .map(|idx| (idx, key.as_str(), value.as_str()))
            })
            .collect();
        // longest key wins when two start at the same column
        hits.sort_by_key(|(idx, key, _)| (*idx, Reverse(key.len())));
        let mut cursor = 0;
        for (idx, key, value) in hits {
            if idx < cursor {
                continue;
            }
            out.push_str(&line[cursor..idx]);
            out.push_str(value);
            cursor = idx + key.len();
        }
        out.push_str(&line[cursor..]);
    }
    out
}

/// Edit the checkout for `change`. `submodule_dir` is the directory git created
/// for a submodule add; it is ignored for other changes.
pub(super) fn apply_to_checkout(
    repo: &Path,
    index_rel: &str,
    change: &DeployChange,
    submodule_dir: Option<&Path>,
) -> Result<()> {
    let index_path = repo.join(index_rel);
    let updated = match change {
        DeployChange::Replace { from, to } => {
            let text = read_text(&index_path)?;
            replace_first_per_line(&text, from, to)
        }
        DeployChange::Template { source, params } => {
            let text = read_text(source)?;
            apply_params(&text, params)
        }
        DeployChange::Submodule { .. } => {
            let dir = submodule_dir.ok_or_else(|| anyhow!("submodule checkout missing"))?;
            let replacement = read_text(&dir.join("index"))?;
            let text = read_text(&index_path)?;
            replace_first_per_line(&text, SUBMODULE_PLACEHOLDER, replacement.trim_end())
        }
    };
    if let Some(parent) = index_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&index_path, updated.as_bytes())
        .with_context(|| format!("write {}", index_path.display()))?;
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_touches_first_occurrence_on_each_line() {
        let text = "Welcome Welcome\nnothing\nWelcome";
        assert_eq!(
            replace_first_per_line(text, "Welcome", "TEST"),
            "TEST Welcome\nnothing\nTEST"
        );
    }

    #[test]
    fn mysql_template_params_are_substituted() {
        let mut params = BTreeMap::new();
        params.insert("HOSTNAME".to_string(), "127.1.2.3".to_string());
        params.insert("USER".to_string(), "admin".to_string());
        params.insert("PASSWORD".to_string(), "s3cret".to_string());
        let text = "mysql_connect('HOSTNAME', 'USER', 'PASSWORD');\necho 'Success';\n";
        assert_eq!(
            apply_params(text, &params),
            "mysql_connect('127.1.2.3', 'admin', 's3cret');\necho 'Success';\n"
        );
    }

    #[test]
    fn substituted_values_are_not_rewritten_by_later_keys() {
        let mut params = BTreeMap::new();
        params.insert("HOSTNAME".to_string(), "db-USER.local".to_string());
        params.insert("USER".to_string(), "admin".to_string());
        params.insert("PASSWORD".to_string(), "USERPASSWORD".to_string());
        let text = "HOSTNAME USER PASSWORD\n";
        assert_eq!(
            apply_params(text, &params),
            "db-USER.local admin USERPASSWORD\n"
        );
    }

    #[test]
    fn index_file_follows_cartridge_family() {
        assert_eq!(index_file("php-5.3"), "php/index.php");
        assert_eq!(index_file("ruby-1.9"), "config.ru");
        assert_eq!(index_file("jbossas-7"), "src/main/webapp/index.html");
        assert_eq!(index_file("unknown"), "index.html");
    }

    #[test]
    fn checkout_edits_write_the_index_file() {
        let repo = tempfile::tempdir().unwrap();
        let index = repo.path().join("php/index.php");
        fs::create_dir_all(index.parent().unwrap()).unwrap();
        fs::write(&index, "<h1>Welcome to OpenShift</h1>\n").unwrap();

        let change = DeployChange::Replace {
            from: "Welcome".to_string(),
            to: "TEST".to_string(),
        };
        apply_to_checkout(repo.path(), "php/index.php", &change, None).unwrap();
        assert_eq!(fs::read_to_string(&index).unwrap(), "<h1>TEST to OpenShift</h1>\n");

        let sub = repo.path().join("submodule_test_repo");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("index"), "Submodule\n").unwrap();
        let change = DeployChange::Submodule { repo: sub.clone() };
        apply_to_checkout(repo.path(), "php/index.php", &change, Some(&sub)).unwrap();
        assert_eq!(fs::read_to_string(&index).unwrap(), "<h1>TEST to Submodule</h1>\n");
    }

    #[test]
    fn submodule_change_requires_checkout() {
        let repo = tempfile::tempdir().unwrap();
        let change = DeployChange::Submodule {
            repo: PathBuf::from("/nowhere"),
        };
        let err = apply_to_checkout(repo.path(), "index.html", &change, None).unwrap_err();
        assert!(err.to_string().contains("submodule checkout missing"));
    }
}
