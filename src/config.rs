//! Git-config-backed ambient configuration, under the `narrate.*`
//! namespace, following the same `repo.config().and_then(...)` accessor
//! pattern as `git-absorb`'s original `absorb.*` settings.

pub const MAX_STACK_CONFIG_NAME: &str = "narrate.maxStack";
pub const MAX_STACK_DEFAULT: usize = 10;

pub const SIMILARITY_CONFIG_NAME: &str = "narrate.similarity";
pub const SIMILARITY_DEFAULT: u8 = 50;

pub const QUERY_CONFIG_PATH_CONFIG_NAME: &str = "narrate.queryConfigPath";

/// Cap on the number of commits the synthesizer may mint; past this, the
/// remaining groups collapse into one terminal commit (`lib.rs`'s
/// `collapse_to_stack_limit`). Mirrors `absorb.maxStack`'s role of bounding
/// how deep a stack of fixup commits may grow.
pub fn max_stack(repo: &git2::Repository) -> usize {
    match repo.config().and_then(|config| config.get_i64(MAX_STACK_CONFIG_NAME)) {
        Ok(n) if n > 0 => n as usize,
        _ => MAX_STACK_DEFAULT,
    }
}

/// Rename-detection similarity threshold passed to `git diff -M<n>%`.
pub fn similarity(repo: &git2::Repository) -> u8 {
    match repo.config().and_then(|config| config.get_i64(SIMILARITY_CONFIG_NAME)) {
        Ok(n) if (0..=100).contains(&n) => n as u8,
        _ => SIMILARITY_DEFAULT,
    }
}

/// Optional override path for the tree-sitter query config, in place of the
/// crate's embedded `resources/queries.json` default.
pub fn query_config_path(repo: &git2::Repository) -> Option<String> {
    repo.config()
        .and_then(|config| config.get_string(QUERY_CONFIG_PATH_CONFIG_NAME))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_no_repo_config_set() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        assert_eq!(max_stack(&repo), MAX_STACK_DEFAULT);
        assert_eq!(similarity(&repo), SIMILARITY_DEFAULT);
        assert_eq!(query_config_path(&repo), None);
    }

    #[test]
    fn reads_overridden_similarity_from_repo_config() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        repo.config().unwrap().set_i64(SIMILARITY_CONFIG_NAME, 80).unwrap();
        assert_eq!(similarity(&repo), 80);
    }
}
