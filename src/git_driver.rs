//! Thin wrapper over the `git` plumbing commands the pipeline needs.
//!
//! Grounded in `CryptArtificer-booger`'s `git/diff.rs`, which shells out to
//! `git` rather than linking libgit2 for this kind of work -- the right
//! call here too, since every one of these operations is a single plumbing
//! command, not an object-graph traversal. `git2` is kept for the one thing
//! it does better than a subprocess: resolving commit-ish arguments and
//! discovering the repository, exactly as `git-absorb` used
//! `Repository::open_from_env()`.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::PipelineError;

pub struct GitDriver {
    repo_path: std::path::PathBuf,
}

impl GitDriver {
    pub fn discover(repo: &git2::Repository) -> Self {
        GitDriver {
            repo_path: repo.path().to_path_buf(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir").arg(&self.repo_path);
        cmd.args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, PipelineError> {
        let output = self
            .command(args)
            .output()
            .map_err(|e| PipelineError::Git {
                command: args.join(" "),
                stderr: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(PipelineError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::Git {
                command: args.join(" "),
                stderr: e.to_string(),
            })?;
        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(stdin)
            .map_err(|e| PipelineError::Git {
                command: args.join(" "),
                stderr: e.to_string(),
            })?;
        let output = child.wait_with_output().map_err(|e| PipelineError::Git {
            command: args.join(" "),
            stderr: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(PipelineError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    /// `git diff --no-color --unified=0 -M<similarity> base..target [-- path]`
    pub fn diff(
        &self,
        base: &str,
        target: &str,
        similarity: u8,
        pathspec: Option<&Path>,
    ) -> Result<Vec<u8>, PipelineError> {
        let sim = format!("-M{similarity}%");
        let range = format!("{base}..{target}");
        let mut args = vec!["diff", "--no-color", "--unified=0", &sim, &range];
        let path_str;
        if let Some(p) = pathspec {
            path_str = p.to_string_lossy().into_owned();
            args.push("--");
            args.push(&path_str);
        }
        self.run(&args)
    }

    /// `git cat-file -p <commit>:<path>`, returning `None` on a non-zero exit
    /// (the path does not exist at that commit).
    pub fn cat_file_p(&self, commit: &str, path: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
        let spec = format!("{commit}:{}", String::from_utf8_lossy(path));
        let output = self
            .command(&["cat-file", "-p", &spec])
            .output()
            .map_err(|e| PipelineError::Git {
                command: "cat-file -p".to_string(),
                stderr: e.to_string(),
            })?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }

    /// Batched blob lookup via `git cat-file --batch`. `object_ids` are full
    /// hex object ids (obtained from `ls_tree`); returns a map keyed by
    /// object id. One subprocess for the whole batch.
    pub fn cat_file_batch(&self, object_ids: &[String]) -> Result<HashMap<String, Vec<u8>>, PipelineError> {
        if object_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut stdin = Vec::new();
        for id in object_ids {
            stdin.extend_from_slice(id.as_bytes());
            stdin.push(b'\n');
        }
        let raw = self.run_with_stdin(&["cat-file", "--batch"], &stdin)?;
        parse_batch_output(&raw)
    }

    /// Writes a single blob via `git hash-object -w --stdin`. Prefer
    /// `hash_object_batch_paths` when writing more than one blob: this
    /// spawns its own subprocess per call.
    pub fn hash_object(&self, content: &[u8]) -> Result<String, PipelineError> {
        let out = self.run_with_stdin(&["hash-object", "-w", "--stdin"], content)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// `git hash-object -w --stdin-paths`, batching every write in the plan
    /// through one subprocess when blob content already lives in temp files
    /// on disk (see `synthesizer.rs`).
    pub fn hash_object_batch_paths(&self, paths: &[std::path::PathBuf]) -> Result<Vec<String>, PipelineError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut stdin = Vec::new();
        for p in paths {
            stdin.extend_from_slice(p.as_os_str().to_string_lossy().as_bytes());
            stdin.push(b'\n');
        }
        let out = self.run_with_stdin(&["hash-object", "-w", "--stdin-paths"], &stdin)?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(|l| l.trim().to_string())
            .collect())
    }

    /// `git ls-tree -r -z <tree-ish>`, parsed into `(path, mode, object_id)`.
    pub fn ls_tree(&self, tree_ish: &str) -> Result<Vec<(Vec<u8>, String, String)>, PipelineError> {
        let out = self.run(&["ls-tree", "-r", "-z", tree_ish])?;
        Ok(parse_ls_tree(&out))
    }

    /// `git mktree` from `mode SP type SP sha TAB path` lines (NUL-free,
    /// newline separated, matching `git mktree`'s default stdin format).
    /// The object type is inferred from the mode: `040000` is a tree,
    /// everything else (this pipeline only ever produces `100644` regular
    /// files) is a blob.
    pub fn mktree(&self, entries: &[(Vec<u8>, String, String)]) -> Result<String, PipelineError> {
        let mut stdin = Vec::new();
        for (path, mode, oid) in entries {
            let kind = if mode == "040000" { "tree" } else { "blob" };
            stdin.extend_from_slice(mode.as_bytes());
            stdin.push(b' ');
            stdin.extend_from_slice(kind.as_bytes());
            stdin.push(b' ');
            stdin.extend_from_slice(oid.as_bytes());
            stdin.push(b'\t');
            stdin.extend_from_slice(path);
            stdin.push(b'\n');
        }
        let out = self.run_with_stdin(&["mktree"], &stdin)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// `git commit-tree <tree> -p <parent> -m <message>`.
    pub fn commit_tree(&self, tree: &str, parent: Option<&str>, message: &str) -> Result<String, PipelineError> {
        let mut args = vec!["commit-tree", tree];
        if let Some(p) = parent {
            args.push("-p");
            args.push(p);
        }
        args.push("-m");
        args.push(message);
        let out = self.run(&args)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// `git update-ref <refname> <new_oid> [<old_oid>]`.
    pub fn update_ref(&self, refname: &str, new_oid: &str, old_oid: Option<&str>) -> Result<(), PipelineError> {
        let mut args = vec!["update-ref", refname, new_oid];
        if let Some(old) = old_oid {
            args.push(old);
        }
        self.run(&args)?;
        Ok(())
    }

    pub fn rev_parse(&self, commit_ish: &str) -> Result<String, PipelineError> {
        let out = self.run(&["rev-parse", commit_ish])?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    pub fn rev_list(&self, range: &str) -> Result<Vec<String>, PipelineError> {
        let out = self.run(&["rev-list", range])?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }
}

/// Parses `git cat-file --batch` output: each object is framed as
/// `<oid> <type> <size>\n<content>\n`.
fn parse_batch_output(raw: &[u8]) -> Result<HashMap<String, Vec<u8>>, PipelineError> {
    let mut out = HashMap::new();
    let mut i = 0;
    while i < raw.len() {
        let line_end = raw[i..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| i + p)
            .ok_or_else(|| PipelineError::Git {
                command: "cat-file --batch".to_string(),
                stderr: "truncated header".to_string(),
            })?;
        let header = std::str::from_utf8(&raw[i..line_end]).map_err(|_| PipelineError::Git {
            command: "cat-file --batch".to_string(),
            stderr: "non-utf8 header".to_string(),
        })?;
        let mut parts = header.split(' ');
        let oid = parts.next().unwrap_or_default().to_string();
        let _kind = parts.next();
        let size: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PipelineError::Git {
                command: "cat-file --batch".to_string(),
                stderr: format!("bad header: {header}"),
            })?;
        let content_start = line_end + 1;
        let content_end = content_start + size;
        if content_end > raw.len() {
            return Err(PipelineError::Git {
                command: "cat-file --batch".to_string(),
                stderr: "truncated body".to_string(),
            });
        }
        out.insert(oid, raw[content_start..content_end].to_vec());
        i = content_end + 1; // skip trailing newline after the object body
    }
    Ok(out)
}

fn parse_ls_tree(raw: &[u8]) -> Vec<(Vec<u8>, String, String)> {
    raw.split(|&b| b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let tab = entry.iter().position(|&b| b == b'\t')?;
            let (meta, path) = (&entry[..tab], &entry[tab + 1..]);
            let meta = std::str::from_utf8(meta).ok()?;
            let mut fields = meta.split(' ');
            let mode = fields.next()?.to_string();
            let _kind = fields.next()?;
            let oid = fields.next()?.to_string();
            Some((path.to_vec(), mode, oid))
        })
        .collect()
}

/// Resolves a commit-ish with libgit2 rather than a subprocess; cheap,
/// read-only, and already validated by the repository's own object store.
pub fn resolve_commit(repo: &git2::Repository, commit_ish: &str) -> Result<git2::Oid, PipelineError> {
    repo.revparse_single(commit_ish)
        .map(|obj| obj.id())
        .map_err(|e| PipelineError::Git {
            command: format!("rev-parse {commit_ish}"),
            stderr: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ls_tree_nul_separated_entries() {
        let raw = b"100644 blob aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\tfoo.txt\0040000 tree bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\tsub\0";
        let entries = parse_ls_tree(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"foo.txt");
        assert_eq!(entries[0].1, "100644");
        assert_eq!(entries[1].0, b"sub");
    }

    #[test]
    fn parses_cat_file_batch_framing() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"aaaa blob 5\nhello\n");
        raw.extend_from_slice(b"bbbb blob 3\nbye\n");
        let parsed = parse_batch_output(&raw).unwrap();
        assert_eq!(parsed.get("aaaa").unwrap(), b"hello");
        assert_eq!(parsed.get("bbbb").unwrap(), b"bye");
    }
}
