use crate::error::{EngineError, EngineResult};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Joins `rel` onto `root`, refusing anything that could leave the tree.
fn resolve(root: &Path, rel: &Path) -> EngineResult<PathBuf> {
    let mut out = root.to_path_buf();
    let mut depth = 0usize;
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => return Err(EngineError::InvalidPath(rel.to_path_buf())),
        }
    }
    if depth == 0 {
        return Err(EngineError::InvalidPath(rel.to_path_buf()));
    }
    Ok(out)
}

/// Moves a file or directory inside one origin. Happens immediately; there is no undo.
pub fn move_within_origin(root: &Path, from: &Path, to: &Path) -> EngineResult<PathBuf> {
    let source = resolve(root, from)?;
    let dest = resolve(root, to)?;
    if !source.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", source.display()),
        )
        .into());
    }
    if dest.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        )
        .into());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&source, &dest)?;
    log::info!(
        "moved {} to {} in {}",
        from.display(),
        to.display(),
        root.display()
    );
    Ok(dest)
}

/// Renames the last component of `path`; `new_name` must be a bare file name.
pub fn rename_within_origin(root: &Path, path: &Path, new_name: &str) -> EngineResult<PathBuf> {
    let name = Path::new(new_name);
    let mut components = name.components();
    let bare = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !bare {
        return Err(EngineError::InvalidPath(name.to_path_buf()));
    }
    let target = match path.parent() {
        Some(parent) => parent.join(name),
        None => name.to_path_buf(),
    };
    move_within_origin(root, path, &target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn moves_create_missing_parents() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("meshes")).unwrap();
        fs::write(dir.path().join("meshes/a.nif"), "a").unwrap();

        let dest =
            move_within_origin(dir.path(), Path::new("meshes/a.nif"), Path::new("optional/a.nif"))
                .unwrap();
        assert_eq!(dest, dir.path().join("optional/a.nif"));
        assert_eq!(fs::read_to_string(dest).unwrap(), "a");
        assert!(!dir.path().join("meshes/a.nif").exists());
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.esp"), "a").unwrap();
        for bad in ["../a.esp", "/tmp/a.esp", "", "x/../../a.esp"] {
            assert!(
                matches!(
                    move_within_origin(dir.path(), Path::new("a.esp"), Path::new(bad)),
                    Err(EngineError::InvalidPath(_))
                ),
                "{bad}"
            );
        }
        assert!(matches!(
            rename_within_origin(dir.path(), Path::new("a.esp"), "sub/b.esp"),
            Err(EngineError::InvalidPath(_))
        ));
        assert!(dir.path().join("a.esp").exists());
    }

    #[test]
    fn rename_keeps_the_directory_and_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/a.pex"), "a").unwrap();
        fs::write(dir.path().join("scripts/c.pex"), "c").unwrap();

        rename_within_origin(dir.path(), Path::new("scripts/a.pex"), "b.pex").unwrap();
        assert!(dir.path().join("scripts/b.pex").exists());
        assert!(matches!(
            rename_within_origin(dir.path(), Path::new("scripts/b.pex"), "c.pex"),
            Err(EngineError::Io(_))
        ));
        assert_eq!(fs::read_to_string(dir.path().join("scripts/c.pex")).unwrap(), "c");
    }
}
