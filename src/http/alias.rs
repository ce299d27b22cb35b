//! URI prefix aliases.
//!
//! The table is built once from configuration and only read while serving.
//! Entries are tried in configuration order and the first matching prefix
//! wins.

use serde::Deserialize;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    /// Serve files from another directory.
    Alias,
    /// Run the matched path as a script.
    ScriptAlias,
    /// Answer with a redirect to another location.
    Redirect,
}

#[derive(Debug, Clone)]
pub struct Alias {
    pub kind: AliasKind,
    pub fakename: String,
    pub realname: String,
}

/// A URI that matched an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMatch<'a> {
    pub kind: AliasKind,
    /// The replacement prefix followed by the unmatched remainder.
    pub target: String,
    /// The part of the URI after the alias prefix.
    pub rest: &'a str,
    pub fakename: &'a str,
    pub realname: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<Alias>,
}

impl AliasTable {
    pub fn new(entries: Vec<Alias>) -> Self {
        Self { entries }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.aliases
                .iter()
                .map(|a| Alias {
                    kind: a.kind,
                    fakename: a.from.clone(),
                    realname: a.to.clone(),
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the first alias whose prefix starts `uri`.
    pub fn translate<'a>(&'a self, uri: &'a str) -> Option<AliasMatch<'a>> {
        self.entries.iter().find_map(|alias| {
            let rest = uri.strip_prefix(alias.fakename.as_str())?;
            Some(AliasMatch {
                kind: alias.kind,
                target: format!("{}{}", alias.realname, rest),
                rest,
                fakename: &alias.fakename,
                realname: &alias.realname,
            })
        })
    }
}
