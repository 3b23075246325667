//! Reads a path's content as it existed at a given commit.
//!
//! Grounded in `CryptArtificer-booger::git::diff::git_show`, generalized
//! from `git show <ref>:<path>` (text-only) to `cat-file -p` so binary and
//! non-UTF-8 content round-trips unchanged.

use crate::error::PipelineError;
use crate::git_driver::GitDriver;

/// Returns `None` if `path` does not exist at `commit`.
pub fn read(driver: &GitDriver, commit: &str, path: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
    driver.cat_file_p(commit, path)
}

#[cfg(test)]
mod tests {
    // `GitDriver` shells out to `git`; exercised end-to-end in
    // `src/tests/pipeline_e2e.rs` against a real temp repository rather
    // than mocked here.
}
