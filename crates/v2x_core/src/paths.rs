//! Path helpers shared by config loading, driver resolution and job setup.
//!
//! Paths typed into the front-end or stored in the config may contain
//! environment variables (`$HOME`, `${APPDATA}`, `%LOCALAPPDATA%`). They are
//! expanded here before anything touches the filesystem.

use std::env;
use std::path::{Path, PathBuf};

/// Name of the cache subdirectory created under the platform temp dir.
pub const CACHE_DIR_NAME: &str = "video2x";

/// Number of numbered candidates tried by [`generate_output_path`].
pub const MAX_OUTPUT_PATH_ATTEMPTS: u32 = 1000;

/// Expand environment variables in `input`.
///
/// Supports `$NAME`, `${NAME}` and `%NAME%`. Unknown variables are left
/// untouched.
pub fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(|c: char| c == '$' || c == '%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match expand_one(tail) {
            Some((value, consumed)) => {
                out.push_str(&value);
                rest = &tail[consumed..];
            }
            None => {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Expand a single variable reference at the start of `tail`.
///
/// Returns the value and how many bytes of `tail` the reference used.
fn expand_one(tail: &str) -> Option<(String, usize)> {
    let (name, consumed) = if let Some(body) = tail.strip_prefix("${") {
        let end = body.find('}')?;
        (&body[..end], end + 3)
    } else if let Some(body) = tail.strip_prefix('$') {
        let end = body
            .find(|c: char| !is_var_char(c))
            .unwrap_or(body.len());
        (&body[..end], end + 1)
    } else {
        let body = tail.strip_prefix('%')?;
        let end = body.find('%')?;
        (&body[..end], end + 2)
    };

    if name.is_empty() || !name.chars().all(is_var_char) {
        return None;
    }

    env::var(name).ok().map(|value| (value, consumed))
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expand variables and convert to a path.
pub fn expand_path(input: &str) -> PathBuf {
    PathBuf::from(expand_vars(input.trim()))
}

/// Make `path` absolute against the current directory.
///
/// Falls back to the path as given if the current directory is unavailable.
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Derive a model directory from a driver binary path.
///
/// Models live next to the binary: `parent(binary) / subfolder? / model`.
pub fn model_dir(binary_path: &Path, subfolder: Option<&str>, model: &str) -> PathBuf {
    let mut dir = binary_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if let Some(subfolder) = subfolder {
        dir.push(subfolder);
    }
    dir.push(model);
    absolutize(&dir)
}

/// Cache directory used when the config leaves it unset.
pub fn default_cache_directory() -> PathBuf {
    absolutize(&env::temp_dir().join(CACHE_DIR_NAME))
}

/// Suggest an output path next to `input` that does not exist yet.
///
/// Files map to `<stem>_output.mp4`, folders to `<stem>_output`. When that
/// is taken, `_0`, `_1`, ... are appended up to [`MAX_OUTPUT_PATH_ATTEMPTS`].
/// Returns `None` if `input` is neither a file nor a folder, or every
/// candidate is taken.
pub fn generate_output_path(input: &Path) -> Option<PathBuf> {
    let is_file = input.is_file();
    if !is_file && !input.is_dir() {
        return None;
    }

    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    let stem = input.file_stem()?.to_string_lossy();

    let candidate = |id: Option<u32>| {
        let suffix = id.map(|id| format!("_{id}")).unwrap_or_default();
        if is_file {
            parent.join(format!("{stem}_output{suffix}.mp4"))
        } else {
            parent.join(format!("{stem}_output{suffix}"))
        }
    };

    std::iter::once(None)
        .chain((0..=MAX_OUTPUT_PATH_ATTEMPTS).map(Some))
        .map(candidate)
        .find(|path| !path.exists())
        .map(|path| absolutize(&path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn expands_all_variable_styles() {
        env::set_var("V2X_TEST_ROOT", "/opt/v2x");
        assert_eq!(expand_vars("$V2X_TEST_ROOT/bin"), "/opt/v2x/bin");
        assert_eq!(expand_vars("${V2X_TEST_ROOT}/bin"), "/opt/v2x/bin");
        assert_eq!(expand_vars("%V2X_TEST_ROOT%\\bin"), "/opt/v2x\\bin");
    }

    #[test]
    fn leaves_unknown_variables_alone() {
        assert_eq!(
            expand_vars("$V2X_SURELY_UNSET/x"),
            "$V2X_SURELY_UNSET/x"
        );
        assert_eq!(expand_vars("100% done"), "100% done");
        assert_eq!(expand_vars("cost $"), "cost $");
    }

    #[test]
    fn model_dir_sits_next_to_binary() {
        let dir = model_dir(
            Path::new("/opt/waifu2x-caffe/waifu2x-caffe-cui"),
            Some("models"),
            "cunet",
        );
        assert_eq!(dir, PathBuf::from("/opt/waifu2x-caffe/models/cunet"));

        let dir = model_dir(Path::new("/opt/ncnn/waifu2x-ncnn-vulkan"), None, "models-cunet");
        assert_eq!(dir, PathBuf::from("/opt/ncnn/models-cunet"));
    }

    #[test]
    fn default_cache_is_named_for_product() {
        let cache = default_cache_directory();
        assert!(cache.is_absolute());
        assert!(cache.ends_with(CACHE_DIR_NAME));
    }

    #[test]
    fn output_path_for_file_avoids_existing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        fs::write(&input, b"").unwrap();

        let first = generate_output_path(&input).unwrap();
        assert_eq!(first, dir.path().join("clip_output.mp4"));

        fs::write(&first, b"").unwrap();
        let second = generate_output_path(&input).unwrap();
        assert_eq!(second, dir.path().join("clip_output_0.mp4"));
    }

    #[test]
    fn output_path_for_folder_uses_counter() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("frames");
        fs::create_dir(&input).unwrap();

        let first = generate_output_path(&input).unwrap();
        assert_eq!(first, dir.path().join("frames_output"));

        fs::create_dir(&first).unwrap();
        fs::create_dir(dir.path().join("frames_output_0")).unwrap();
        let third = generate_output_path(&input).unwrap();
        assert_eq!(third, dir.path().join("frames_output_1"));
    }

    #[test]
    fn output_path_requires_existing_input() {
        let dir = tempdir().unwrap();
        assert!(generate_output_path(&dir.path().join("missing.mp4")).is_none());
    }
}
