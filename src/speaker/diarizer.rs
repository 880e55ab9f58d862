//! Diarizer (§4.F): agglomerative clustering with average linkage under
//! cosine distance, choosing k via silhouette score, falling back to k=2 on
//! any failure. Grounded in the donor's `diarization::clustering` shape
//! (HashMap-keyed clusters, speaker-count enforcement) generalized to the
//! literal silhouette-search algorithm this service is specified against.

use std::collections::HashMap;

use tracing::warn;

use crate::speaker::types::{DiarizationError, DiarizedCluster, EmbeddingWindow, VoiceCharacteristics, EMBEDDING_DIM};

/// Cluster a batch of embedding windows into speakers, ordered by first
/// occurrence of each cluster.
pub fn diarize(windows: &[EmbeddingWindow]) -> Vec<DiarizedCluster> {
    if let Err(e) = validate_dimensions(windows) {
        warn!(error = %e, "embedding dimension check failed, falling back to a single cluster");
        return vec![single_cluster(windows)];
    }

    if windows.len() < 2 {
        return vec![single_cluster(windows)];
    }

    let max_k = (windows.len() / 2).min(10).max(2);
    let mut best_k = 2;
    let mut best_score = f32::MIN;
    let mut found_any = false;

    for k in 2..=max_k {
        let labels = agglomerative_labels(windows, k);
        if let Some(score) = silhouette_score(windows, &labels) {
            found_any = true;
            if score > best_score {
                best_score = score;
                best_k = k;
            }
        }
    }

    if !found_any {
        warn!("silhouette search produced no valid score, falling back to k=2");
        best_k = 2;
    }

    let labels = agglomerative_labels(windows, best_k);
    build_clusters(windows, &labels)
}

/// §3's "embedding dimensionality is globally constant" invariant, checked
/// once up front rather than at every pairwise distance call. A mismatch
/// can only arise from a corrupted `EmbeddingWindow` constructed outside
/// `embedding::extract`, since that function always returns `EMBEDDING_DIM`.
fn validate_dimensions(windows: &[EmbeddingWindow]) -> Result<(), DiarizationError> {
    for window in windows {
        let got = window.embedding.len();
        if got != EMBEDDING_DIM {
            return Err(DiarizationError::DimensionMismatch { expected: EMBEDDING_DIM, got });
        }
    }
    Ok(())
}

fn single_cluster(windows: &[EmbeddingWindow]) -> DiarizedCluster {
    let indices: Vec<usize> = (0..windows.len()).collect();
    DiarizedCluster {
        cluster_id: 0,
        average_embedding: average_embedding(windows, &indices),
        voice_characteristics: voice_characteristics(windows, &indices),
        window_indices: indices,
    }
}

/// Bottom-up average-linkage merge under cosine distance until exactly `k`
/// clusters remain. Returns a label per input window.
fn agglomerative_labels(windows: &[EmbeddingWindow], k: usize) -> Vec<usize> {
    let n = windows.len();
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > k {
        let (mut best_i, mut best_j, mut best_distance) = (0, 1, f32::MAX);
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let distance = average_linkage_distance(windows, &clusters[i], &clusters[j]);
                if distance < best_distance {
                    best_distance = distance;
                    best_i = i;
                    best_j = j;
                }
            }
        }
        let merged = {
            let mut combined = clusters[best_i].clone();
            combined.extend_from_slice(&clusters[best_j]);
            combined
        };
        clusters.remove(best_j);
        clusters.remove(best_i);
        clusters.push(merged);
    }

    let mut labels = vec![0usize; n];
    for (label, cluster) in clusters.iter().enumerate() {
        for &idx in cluster {
            labels[idx] = label;
        }
    }
    labels
}

fn average_linkage_distance(windows: &[EmbeddingWindow], a: &[usize], b: &[usize]) -> f32 {
    let mut total = 0.0f32;
    let mut count = 0usize;
    for &i in a {
        for &j in b {
            total += cosine_distance(&windows[i], &windows[j]);
            count += 1;
        }
    }
    if count == 0 {
        f32::MAX
    } else {
        total / count as f32
    }
}

fn cosine_distance(a: &EmbeddingWindow, b: &EmbeddingWindow) -> f32 {
    1.0 - a.embedding.cosine_similarity(&b.embedding)
}

/// Silhouette score over cosine distance; `None` if every point ends up a
/// singleton cluster or any other condition makes the score undefined.
fn silhouette_score(windows: &[EmbeddingWindow], labels: &[usize]) -> Option<f32> {
    let n = windows.len();
    let unique_labels: std::collections::HashSet<usize> = labels.iter().copied().collect();
    if unique_labels.len() < 2 {
        return None;
    }

    let mut total = 0.0f32;
    let mut counted = 0usize;

    for i in 0..n {
        let own_label = labels[i];
        let mut same_cluster_distances = Vec::new();
        let mut other_cluster_means: HashMap<usize, (f32, usize)> = HashMap::new();

        for j in 0..n {
            if i == j {
                continue;
            }
            let distance = cosine_distance(&windows[i], &windows[j]);
            if labels[j] == own_label {
                same_cluster_distances.push(distance);
            } else {
                let entry = other_cluster_means.entry(labels[j]).or_insert((0.0, 0));
                entry.0 += distance;
                entry.1 += 1;
            }
        }

        if same_cluster_distances.is_empty() {
            continue; // singleton cluster: silhouette undefined for this point
        }

        let a = same_cluster_distances.iter().sum::<f32>() / same_cluster_distances.len() as f32;
        let b = other_cluster_means
            .values()
            .map(|(sum, count)| sum / *count as f32)
            .fold(f32::MAX, f32::min);

        if b == f32::MAX {
            continue;
        }

        let s = (b - a) / a.max(b);
        total += s;
        counted += 1;
    }

    if counted == 0 {
        None
    } else {
        Some(total / counted as f32)
    }
}

fn build_clusters(windows: &[EmbeddingWindow], labels: &[usize]) -> Vec<DiarizedCluster> {
    let mut by_label: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut first_occurrence: Vec<usize> = Vec::new();

    for (idx, &label) in labels.iter().enumerate() {
        if !by_label.contains_key(&label) {
            first_occurrence.push(label);
        }
        by_label.entry(label).or_default().push(idx);
    }

    first_occurrence
        .into_iter()
        .enumerate()
        .map(|(cluster_id, label)| {
            let indices = by_label.remove(&label).unwrap_or_default();
            DiarizedCluster {
                cluster_id,
                average_embedding: average_embedding(windows, &indices),
                voice_characteristics: voice_characteristics(windows, &indices),
                window_indices: indices,
            }
        })
        .collect()
}

fn average_embedding(
    windows: &[EmbeddingWindow],
    indices: &[usize],
) -> crate::speaker::types::Embedding {
    if indices.is_empty() {
        return crate::speaker::types::Embedding::zero();
    }
    let dim = windows[indices[0]].embedding.len();
    let mut sum = vec![0.0f32; dim];
    for &idx in indices {
        for (s, v) in sum.iter_mut().zip(windows[idx].embedding.0.iter()) {
            *s += v;
        }
    }
    for s in sum.iter_mut() {
        *s /= indices.len() as f32;
    }
    crate::speaker::types::Embedding(sum)
}

fn voice_characteristics(windows: &[EmbeddingWindow], indices: &[usize]) -> VoiceCharacteristics {
    let mut all_samples: Vec<f32> = Vec::new();
    let mut total_speaking_time = 0.0f32;
    for &idx in indices {
        all_samples.extend_from_slice(&windows[idx].samples);
        total_speaking_time += windows[idx].end_s - windows[idx].start_s;
    }

    if all_samples.is_empty() {
        return VoiceCharacteristics {
            average_pitch: 0.0,
            pitch_variance: 0.0,
            speaking_rate: 0.0,
            volume_level: 0.0,
            total_speaking_time: 0.0,
        };
    }

    let mean = all_samples.iter().sum::<f32>() / all_samples.len() as f32;
    let variance =
        all_samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / all_samples.len() as f32;
    let rms = (all_samples.iter().map(|s| s * s).sum::<f32>() / all_samples.len() as f32).sqrt();
    let speaking_rate = if total_speaking_time > 0.0 {
        indices.len() as f32 / total_speaking_time
    } else {
        0.0
    };

    VoiceCharacteristics {
        average_pitch: mean,
        pitch_variance: variance,
        speaking_rate,
        volume_level: rms,
        total_speaking_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speaker::types::Embedding;

    fn window(seed: f32, start_s: f32) -> EmbeddingWindow {
        EmbeddingWindow {
            start_s,
            end_s: start_s + 2.0,
            embedding: Embedding((0..39).map(|i| seed + i as f32 * 0.001).collect()),
            samples: vec![seed.sin(); 100],
        }
    }

    #[test]
    fn single_window_yields_one_cluster() {
        let windows = vec![window(1.0, 0.0)];
        let clusters = diarize(&windows);
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn two_distinct_voices_separate_into_two_clusters() {
        let mut windows = Vec::new();
        for i in 0..6 {
            windows.push(window(1.0, i as f32 * 2.0));
        }
        for i in 0..6 {
            windows.push(window(-20.0, (i + 6) as f32 * 2.0));
        }
        let clusters = diarize(&windows);
        assert_eq!(clusters.len(), 2);
        let total: usize = clusters.iter().map(|c| c.window_indices.len()).sum();
        assert_eq!(total, windows.len());
    }

    #[test]
    fn mismatched_embedding_dimensions_fall_back_to_a_single_cluster() {
        let mut windows = vec![window(1.0, 0.0), window(-20.0, 2.0)];
        windows.push(EmbeddingWindow {
            start_s: 4.0,
            end_s: 6.0,
            embedding: Embedding(vec![0.0; 5]),
            samples: vec![0.0; 100],
        });
        let clusters = diarize(&windows);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].window_indices.len(), windows.len());
    }

    #[test]
    fn clusters_are_ordered_by_first_occurrence() {
        let windows = vec![window(1.0, 0.0), window(1.0, 2.0), window(-20.0, 4.0)];
        let clusters = diarize(&windows);
        assert!(clusters[0].window_indices.contains(&0));
    }
}
