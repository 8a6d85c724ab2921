//! Offline embeddings by feature hashing.

use super::Embedder;
use anyhow::Error;
use async_trait::async_trait;
use std::collections::HashMap;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Embeds documents by hashing their words and word pairs into a fixed number of buckets.
///
/// Each token adds `1 + ln(tf)` to its bucket, with a sign taken from the hash so that collisions
/// tend to cancel out. Vectors are L2-normalized.
#[derive(Clone, Copy, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 256;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed a single document.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in tokens(text) {
            *counts.entry(token).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (token, tf) in counts {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign * (1.0 + (tf as f32).ln());
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> String {
        format!("hashing-{}", self.dimensions)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Lower-cased words followed by adjacent word pairs.
fn tokens(text: &str) -> Vec<String> {
    let words = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>();
    let pairs = words
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect::<Vec<_>>();
    words.into_iter().chain(pairs).collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::embed::cosine_similarity;

    #[test]
    fn test_tokens() {
        assert_eq!(
            tokens("How old are you?\nAge: 18-25"),
            [
                "how", "old", "are", "you", "age", "18", "25", "how old", "old are", "are you",
                "you age", "age 18", "18 25"
            ]
        );
        assert!(tokens(" -- ").is_empty());
    }

    #[test]
    fn test_fnv1a() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[async_std::test]
    async fn test_embeddings() {
        let embedder = HashingEmbedder::default();
        let texts = [
            "gender: female\nage: 26-35\nfeel: excited\ncountry: Kenya",
            "gender: female\nage: 26-35\nfeel: excited\ncountry: Brazil",
            "religion: Buddhism\nlife in 30 years: robots doing chores",
            "",
        ]
        .map(String::from);
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 4);

        for vector in &vectors[..3] {
            assert_eq!(vector.len(), HashingEmbedder::DEFAULT_DIMENSIONS);
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm {norm}");
        }
        assert!(vectors[3].iter().all(|&x| x == 0.0));

        // Deterministic.
        assert_eq!(vectors[0], embedder.embed_one(&texts[0]));

        // Rows that share most answers are closer than rows that share none.
        let near = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(near > 0.5, "near {near}");
        assert!(near > far, "near {near}, far {far}");
    }
}
