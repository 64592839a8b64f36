// src/utils.rs

use crate::error::*;
use anyhow::Context;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Component, Path, PathBuf},
};

/// 规范化请求中的相对路径。
///
/// 反斜杠视为分隔符，去掉开头的 `/` 和 `.` 段；
/// 含 `..`、盘符或结果为空时返回 None。
pub fn safe_relpath(raw: &str) -> Option<String> {
    let normalized = raw.trim().replace('\\', "/");
    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            p if p.contains(':') => return None,
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// 将已校验的相对路径拼接到基础目录下，拒绝任何越界分量。
pub fn secure_join_path(base_dir: &Path, relative_path: &str) -> AppResult<PathBuf> {
    let mut final_path = base_dir.to_path_buf();
    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => final_path.push(part),
            Component::CurDir => continue,
            _ => {
                return Err(AppError::BadRequest(format!(
                    "非法路径: '{}'",
                    relative_path
                )));
            }
        }
    }
    Ok(final_path)
}

/// 规范化目录路径（目录不存在时先创建）。
pub fn canonical_dir(dir: &Path) -> AppResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dunce::canonicalize(dir).with_context(|| format!("目录 '{:?}' 无法访问", dir))?)
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

pub fn calculate_file_md5(path: &Path) -> AppResult<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buffer = [0; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// 两个时间点之间的秒数，`later` 早于 `earlier` 时为 0。
pub fn secs_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_milliseconds().max(0)) as f64 / 1000.0
}

/// 新的短 ID（uuid v4 的前 `len` 个十六进制字符）
pub fn short_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len);
    id
}

/// 根据扩展名推断 Content-Type
pub fn content_type_for(name: &str) -> String {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    let essence = mime.essence_str();
    if mime.type_() == mime_guess::mime::TEXT || essence == "application/javascript" {
        format!("{}; charset=utf-8", essence)
    } else {
        essence.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_relpath() {
        assert_eq!(safe_relpath("index.html").as_deref(), Some("index.html"));
        assert_eq!(safe_relpath("/images//bg.jpg").as_deref(), Some("images/bg.jpg"));
        assert_eq!(safe_relpath("images\\bg.jpg").as_deref(), Some("images/bg.jpg"));
        assert_eq!(safe_relpath("./a/./b.css").as_deref(), Some("a/b.css"));

        // 越界与空路径
        assert_eq!(safe_relpath("../etc/passwd"), None);
        assert_eq!(safe_relpath("a/../../b"), None);
        assert_eq!(safe_relpath("C:/windows"), None);
        assert_eq!(safe_relpath(""), None);
        assert_eq!(safe_relpath("///"), None);
    }

    #[test]
    fn test_secure_join_path() {
        let base = Path::new("/srv/static");
        assert_eq!(
            secure_join_path(base, "images/bg.jpg").unwrap(),
            PathBuf::from("/srv/static/images/bg.jpg")
        );
        assert!(secure_join_path(base, "../x").is_err());
        assert!(secure_join_path(base, "/etc/passwd").is_err());
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("style.css"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("images/bg.jpg"), "image/jpeg");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }

    #[test]
    fn test_short_id() {
        let id = short_id(12);
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
