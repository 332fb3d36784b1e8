//! Ordered image sequences read from a directory.

use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "pgm"];

/// Image files directly inside `dir`, in lexicographic order.
pub fn frame_paths(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0002.png", "0001.JPG", "notes.txt", "0010.pgm"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("0000.png")).unwrap();

        let names: Vec<_> = frame_paths(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0001.JPG", "0002.png", "0010.pgm"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(frame_paths(Path::new("/definitely/not/here")).is_err());
    }
}
