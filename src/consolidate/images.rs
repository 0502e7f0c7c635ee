use crate::catalog::image_base_name;
use crate::storage::SqliteStorage;
use rusqlite::params;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReport {
    /// Groups whose canonical file had to be created from a suffixed one
    pub renamed: usize,
    /// Non-canonical files deleted
    pub removed: usize,
    /// Diagram rows re-pointed at a canonical file
    pub diagrams_updated: usize,
}

/// The `image_path` value stored for a file in the images directory
pub fn image_path_for(images_dir: &Path, filename: &str) -> String {
    images_dir.join(filename).to_string_lossy().into_owned()
}

/// De-duplicates image files by their derived base name
///
/// Files are grouped by base name (numeric suffix and extension stripped)
/// and lowercased extension. Each group converges on `<base>.<ext>`: an
/// existing canonical file is kept, otherwise the smallest file name is
/// copied into place. Diagram paths are re-pointed before any file is
/// deleted, so every stored `image_path` names an existing file at every step.
pub fn dedupe_image_files(
    storage: &mut SqliteStorage,
    images_dir: &Path,
) -> crate::Result<ImageReport> {
    let mut report = ImageReport::default();

    let entries = match fs::read_dir(images_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("Images directory {} does not exist", images_dir.display());
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };

    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(filename) = entry.file_name().into_string() else {
            continue;
        };
        let Some((_, ext)) = filename.rsplit_once('.') else {
            continue;
        };
        if filename.starts_with('.') || ext.is_empty() {
            continue;
        }

        let key = (image_base_name(&filename), ext.to_ascii_lowercase());
        groups.entry(key).or_default().push(filename);
    }

    for ((base, ext), mut files) in groups {
        files.sort();
        let canonical = format!("{base}.{ext}");
        let canonical_path = images_dir.join(&canonical);

        if files.len() == 1 && files[0] == canonical {
            continue;
        }

        if !files.contains(&canonical) {
            fs::copy(images_dir.join(&files[0]), &canonical_path)?;
            report.renamed += 1;
        }

        let duplicates: Vec<&String> = files.iter().filter(|f| **f != canonical).collect();

        let canonical_value = image_path_for(images_dir, &canonical);
        let tx = storage.conn_mut().transaction()?;
        for file in &duplicates {
            report.diagrams_updated += tx.execute(
                "UPDATE diagrams SET image_path = ?1 WHERE image_path = ?2",
                params![canonical_value, image_path_for(images_dir, file)],
            )?;
        }
        tx.commit()?;

        for file in duplicates {
            match fs::remove_file(images_dir.join(file)) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!("Consolidated {} image files into {}", files.len(), canonical);
    }

    if report.renamed + report.removed > 0 {
        tracing::info!(
            "Image files: {} canonical files created, {} duplicates removed, {} diagrams re-pointed",
            report.renamed,
            report.removed,
            report.diagrams_updated
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::test_support::*;
    use crate::storage::Storage;

    fn write(dir: &Path, name: &str) {
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_renames_suffixed_files_to_canonical() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "engine-rocker-cover-12159.png");
        write(dir.path(), "engine-rocker-cover-12160.png");

        let mut storage = storage();
        let first = image_path_for(dir.path(), "engine-rocker-cover-12159.png");
        let second = image_path_for(dir.path(), "engine-rocker-cover-12160.png");
        add_diagram(&mut storage, "d1", Some(&first));
        add_diagram(&mut storage, "d2", Some(&second));

        let report = dedupe_image_files(&mut storage, dir.path()).unwrap();
        assert_eq!(
            report,
            ImageReport {
                renamed: 1,
                removed: 2,
                diagrams_updated: 2,
            }
        );

        assert_eq!(listing(dir.path()), vec!["engine-rocker-cover.png"]);
        let canonical = image_path_for(dir.path(), "engine-rocker-cover.png");
        for id in ["d1", "d2"] {
            assert_eq!(
                storage.get_diagram(id).unwrap().unwrap().image_path.as_deref(),
                Some(canonical.as_str())
            );
        }
        // Content comes from the smallest file name
        assert_eq!(
            fs::read_to_string(dir.path().join("engine-rocker-cover.png")).unwrap(),
            "engine-rocker-cover-12159.png"
        );
    }

    #[test]
    fn test_existing_canonical_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a-t-brake.png");
        write(dir.path(), "a-t-brake-67980_67981.png");
        write(dir.path(), "unrelated.png");

        let mut storage = storage();
        add_diagram(
            &mut storage,
            "d1",
            Some(&image_path_for(dir.path(), "a-t-brake-67980_67981.png")),
        );

        let report = dedupe_image_files(&mut storage, dir.path()).unwrap();
        assert_eq!(report.renamed, 0);
        assert_eq!(report.removed, 1);
        assert_eq!(listing(dir.path()), vec!["a-t-brake.png", "unrelated.png"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("a-t-brake.png")).unwrap(),
            "a-t-brake.png"
        );
    }

    #[test]
    fn test_extensions_are_not_mixed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "head-1.png");
        write(dir.path(), "head-2.gif");

        let mut storage = storage();
        dedupe_image_files(&mut storage, dir.path()).unwrap();
        assert_eq!(listing(dir.path()), vec!["head.gif", "head.png"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = storage();
        let report = dedupe_image_files(&mut storage, &dir.path().join("missing")).unwrap();
        assert_eq!(report, ImageReport::default());
    }

    #[test]
    fn test_rerun_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "head-1.png");
        let mut storage = storage();
        dedupe_image_files(&mut storage, dir.path()).unwrap();
        assert_eq!(
            dedupe_image_files(&mut storage, dir.path()).unwrap(),
            ImageReport::default()
        );
    }
}
