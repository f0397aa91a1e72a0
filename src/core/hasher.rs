//! 文件内容哈希 - 仅用于账本对账时确认内容是否真正变化

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// 内容哈希接口
pub trait ContentHasher: Send + Sync {
    /// 计算文件内容的十六进制哈希
    fn compute_hash(&self, path: &Path) -> io::Result<String>;
}

/// 使用 BLAKE3 的流式哈希
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn compute_hash(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculate_hash(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }

    #[test]
    fn test_file_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let hash = Blake3Hasher.compute_hash(&path).unwrap();
        assert_eq!(hash, calculate_hash(&data));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"hello").unwrap();
        std::fs::write(&b, b"hellp").unwrap();

        assert_ne!(
            Blake3Hasher.compute_hash(&a).unwrap(),
            Blake3Hasher.compute_hash(&b).unwrap()
        );
    }
}
