//! Fetching dependency sources.
//!
//! Downloads and checkouts live in `<workdir>/sources/<name>/` and are
//! shared between architectures. Every step is skipped when its output
//! already exists, so re-running a build does not hit the network.

use crate::config::SourceSpec;
use crate::error::{Error, Result};
use crate::tool::{self, BuildEnv};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Fetch `source` into `dir` and return the directory holding the sources.
pub fn fetch(name: &str, source: &SourceSpec, dir: &Path, env: &BuildEnv) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    match source {
        SourceSpec::Archive { url, sha256 } => {
            fetch_archive(name, url, sha256.as_deref(), dir, env)
        }
        SourceSpec::Git {
            url,
            rev,
            after_clone,
        } => fetch_git(name, url, rev, after_clone, dir, env),
    }
}

fn fetch_archive(
    name: &str,
    url: &str,
    sha256: Option<&str>,
    dir: &Path,
    env: &BuildEnv,
) -> Result<PathBuf> {
    let archive = dir.join(url_file_name(url).ok_or_else(|| {
        Error::dependency(name, "fetch", format!("cannot derive a file name from '{}'", url))
    })?);

    if archive.exists() {
        tracing::debug!(archive = %archive.display(), "sources already downloaded");
    } else {
        tracing::info!(name, url, "downloading sources");
        // Renamed only once complete.
        let partial = archive.with_extension("part");
        tool::run(&mut download_command(url, &partial, env))?;
        std::fs::rename(&partial, &archive)?;
    }

    if let Some(expected) = sha256 {
        verify_checksum(&archive, expected)?;
    }

    let listing = tool::stdout_of(&mut list_command(&archive, env))?;
    let top = top_level_dir(&listing).ok_or_else(|| {
        Error::dependency(
            name,
            "extract",
            format!("{} does not have a single top-level directory", archive.display()),
        )
    })?;
    let extracted = dir.join(top);

    if extracted.exists() {
        tracing::debug!(dir = %extracted.display(), "archive already extracted");
        return Ok(extracted);
    }

    tracing::info!(name, archive = %archive.display(), "extracting sources");
    let mut extract = extract_command(&archive, dir, env).ok_or_else(|| {
        Error::dependency(
            name,
            "extract",
            format!("unsupported archive format: {}", archive.display()),
        )
    })?;
    tool::run(&mut extract)?;

    if !extracted.is_dir() {
        return Err(Error::dependency(
            name,
            "extract",
            format!("expected {} after extraction", extracted.display()),
        ));
    }
    Ok(extracted)
}

fn fetch_git(
    name: &str,
    url: &str,
    rev: &str,
    after_clone: &[String],
    dir: &Path,
    env: &BuildEnv,
) -> Result<PathBuf> {
    let repo = url_file_name(url)
        .map(|n| n.trim_end_matches(".git").to_string())
        .ok_or_else(|| {
            Error::dependency(name, "fetch", format!("cannot derive a directory from '{}'", url))
        })?;
    let checkout = dir.join(repo);
    if checkout.exists() {
        tracing::debug!(dir = %checkout.display(), "project already cloned");
        return Ok(checkout);
    }

    tracing::info!(name, url, rev, "cloning sources");
    // A checkout only gets its final name once every hook has run.
    let staging = dir.join(format!(
        ".{}.partial",
        checkout
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }

    for mut cmd in git_commands(url, rev, after_clone, &staging, env) {
        tool::run(&mut cmd)?;
    }
    std::fs::rename(&staging, &checkout)?;
    Ok(checkout)
}

/// Clone, checkout and post-clone commands for a git source.
fn git_commands(
    url: &str,
    rev: &str,
    after_clone: &[String],
    checkout: &Path,
    env: &BuildEnv,
) -> Vec<Command> {
    let mut clone = env.command("git");
    clone.arg("clone").arg(url).arg(checkout);

    let mut commands = vec![clone];

    let mut switch = env.command_in("git", checkout);
    switch.args(["checkout", rev]);
    commands.push(switch);

    for line in after_clone {
        let mut hook = env.command_in("sh", checkout);
        hook.arg("-c").arg(line);
        commands.push(hook);
    }
    commands
}

fn download_command(url: &str, output: &Path, env: &BuildEnv) -> Command {
    let mut cmd = env.command("curl");
    cmd.args(["--fail", "--location", url, "-o"]).arg(output);
    cmd
}

fn list_command(archive: &Path, env: &BuildEnv) -> Command {
    let mut cmd = env.command("tar");
    cmd.arg("-tf").arg(archive);
    cmd
}

/// `tar` invocation for a supported archive, or `None`.
fn extract_command(archive: &Path, dest: &Path, env: &BuildEnv) -> Option<Command> {
    let name = archive.file_name()?.to_string_lossy().into_owned();
    let flag = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        "-xzf"
    } else if name.ends_with(".tar.xz") {
        "-xJf"
    } else if name.ends_with(".tar.bz2") {
        "-xjf"
    } else {
        return None;
    };

    let mut cmd = env.command("tar");
    cmd.arg(flag).arg(archive).arg("-C").arg(dest);
    Some(cmd)
}

/// Last path segment of a URL, without query or fragment.
fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
}

/// The single top-level directory of a `tar -t` listing.
///
/// A listing usually carries an explicit `dir/` entry; some tarballs only
/// list files, in which case the common first component is used.
pub fn top_level_dir(listing: &str) -> Option<String> {
    let entries: Vec<&str> = listing
        .lines()
        .map(|l| l.trim().trim_start_matches("./"))
        .filter(|l| !l.is_empty())
        .collect();

    let explicit: Vec<&str> = entries
        .iter()
        .filter(|e| !e.trim_end_matches('/').contains('/'))
        .copied()
        .collect();
    if explicit.len() == 1 {
        return Some(explicit[0].trim_end_matches('/').to_string());
    }

    let mut roots = entries
        .iter()
        .filter_map(|e| e.split('/').next())
        .filter(|r| !r.is_empty());
    let first = roots.next()?;
    roots.all(|r| r == first).then(|| first.to_string())
}

/// Compare a file's SHA-256 digest against a configured one.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let expected = expected
        .strip_prefix("sha256:")
        .unwrap_or(expected)
        .to_ascii_lowercase();
    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    tracing::debug!(path = %path.display(), "checksum verified");
    Ok(())
}

/// Hex SHA-256 digest of a file, read in chunks.
pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}
