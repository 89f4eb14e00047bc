use hello_vim_protocol::{FileOperation, FileResponse};
use std::io::Write;
use std::path::Path;

pub fn handle(op: &FileOperation) -> FileResponse {
    match op.operation.as_str() {
        "read" => read_file(Path::new(&op.path)),
        "write" => write_file(Path::new(&op.path), &op.content),
        "search" => search_files(Path::new(&op.path), &op.pattern),
        other => FileResponse::failure(format!("unknown operation: {other}")),
    }
}

pub fn read_file(path: &Path) -> FileResponse {
    match std::fs::read(path) {
        Ok(bytes) => FileResponse::with_content(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => FileResponse::failure(format!("failed to read file: {e}")),
    }
}

pub fn write_file(path: &Path, content: &str) -> FileResponse {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = create_dirs(dir) {
            return FileResponse::failure(format!("failed to create directory: {e}"));
        }
    }

    match open_for_write(path).and_then(|mut f| f.write_all(content.as_bytes())) {
        Ok(()) => FileResponse::ok(),
        Err(e) => FileResponse::failure(format!("failed to write file: {e}")),
    }
}

/// Any walk or read error fails the whole search; there is no skip-and-continue.
pub fn search_files(root: &Path, pattern: &str) -> FileResponse {
    match collect_matches(root, pattern.as_bytes()) {
        Ok(matches) => FileResponse::with_matches(matches),
        Err(e) => FileResponse::failure(format!("failed to search files: {e}")),
    }
}

fn collect_matches(root: &Path, pattern: &[u8]) -> std::io::Result<Vec<String>> {
    let mut matches = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let bytes = std::fs::read(entry.path())
            .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", entry.path().display())))?;
        if contains(&bytes, pattern) {
            matches.push(entry.path().to_string_lossy().to_string());
        }
    }
    Ok(matches)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(unix)]
fn create_dirs(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
}

#[cfg(not(unix))]
fn create_dirs(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn open_for_write(path: &Path) -> std::io::Result<std::fs::File> {
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o644);
    }
    opts.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(operation: &str, path: &Path) -> FileOperation {
        FileOperation {
            operation: operation.into(),
            path: path.to_string_lossy().to_string(),
            ..FileOperation::default()
        }
    }

    #[test]
    fn write_then_read_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        let body = "line one\nこんにちは\n\ttabbed";

        let written = handle(&FileOperation {
            content: body.into(),
            ..op("write", &path)
        });
        assert_eq!(written, FileResponse::ok());

        let read = handle(&op("read", &path));
        assert!(read.success);
        assert_eq!(read.content.as_deref(), Some(body));
    }

    #[test]
    fn write_overwrites_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "a much longer original body").unwrap();

        assert!(write_file(&path, "short").success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "short");
    }

    #[cfg(unix)]
    #[test]
    fn write_uses_expected_modes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/f.txt");
        assert!(write_file(&path, "x").success);

        let dir_mode = std::fs::metadata(dir.path().join("nested"))
            .unwrap()
            .permissions()
            .mode();
        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode();
        // umask can only clear bits
        assert_eq!(dir_mode & 0o777 & !0o755, 0);
        assert_eq!(file_mode & 0o777 & !0o644, 0);
    }

    #[test]
    fn write_into_a_file_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let res = write_file(&blocker.join("child.txt"), "x");
        assert!(!res.success);
        assert!(
            res.error
                .unwrap()
                .starts_with("failed to create directory: ")
        );
    }

    #[test]
    fn read_missing_file_reports_cause() {
        let res = handle(&op("read", Path::new("/nonexistent")));
        assert!(!res.success);
        assert!(res.content.is_none());
        assert!(res.error.unwrap().starts_with("failed to read file: "));
    }

    #[test]
    fn search_returns_exactly_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
        std::fs::write(root.join("one.txt"), "needle here").unwrap();
        std::fs::write(root.join("two.txt"), "nothing").unwrap();
        std::fs::write(root.join("sub/three.rs"), "// Needle is not needle? yes needle").unwrap();
        std::fs::write(root.join("sub/deeper/four.md"), "NEEDLE").unwrap();
        std::fs::write(root.join("sub/deeper/five.bin"), [0xff, 0xfe, b'n', b'e', b'e', b'd', b'l', b'e']).unwrap();

        let res = handle(&FileOperation {
            pattern: "needle".into(),
            ..op("search", root)
        });
        assert!(res.success, "{res:?}");
        let expected: Vec<String> = ["one.txt", "sub/deeper/five.bin", "sub/three.rs"]
            .iter()
            .map(|p| root.join(p).to_string_lossy().to_string())
            .collect();
        assert_eq!(res.matches, Some(expected));
    }

    #[test]
    fn search_with_no_hits_is_an_empty_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "abc").unwrap();
        assert_eq!(
            search_files(dir.path(), "xyz"),
            FileResponse::with_matches(vec![])
        );
    }

    #[test]
    fn empty_pattern_matches_every_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        assert_eq!(search_files(dir.path(), "").matches.unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn one_unreadable_entry_fails_the_whole_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "needle").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("b.txt")).unwrap();

        let res = search_files(dir.path(), "needle");
        assert!(!res.success);
        assert!(res.matches.is_none());
        assert!(res.error.unwrap().starts_with("failed to search files: "));
    }

    #[test]
    fn search_missing_root_fails() {
        let res = search_files(Path::new("/nonexistent/search/root"), "x");
        assert!(!res.success);
    }

    #[test]
    fn unknown_operation_is_reported() {
        let res = handle(&op("delete", Path::new("x")));
        assert_eq!(res, FileResponse::failure("unknown operation: delete"));
    }
}
