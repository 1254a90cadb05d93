use std::collections::HashSet;

use futures::stream::{self, StreamExt};

use crate::generator::model::{BackfillStats, GenerateOutcome};
use crate::generator::ThumbnailGenerator;
use crate::imaging::formats::is_supported_image_key;
use crate::keys;

const MAX_ERROR_LOG: usize = 100;

fn log_error(stats: &mut BackfillStats, msg: String) {
    tracing::warn!("backfill: {}", msg);
    stats.errors += 1;
    if stats.error_log.len() < MAX_ERROR_LOG {
        stats.error_log.push(msg);
    }
}

/// Generate missing thumbnails for every image under `prefix`.
///
/// Idempotent: sources whose thumbnail key is already present in the listing
/// are skipped, so running it twice writes nothing the second time. At most
/// `concurrency` generations run at once.
pub async fn run_backfill(
    generator: &ThumbnailGenerator,
    bucket: &str,
    prefix: &str,
    concurrency: usize,
) -> BackfillStats {
    let mut stats = BackfillStats::default();

    // ── STEP 1: List ──────────────────────────────────────────────────────────
    let objects = match generator.store().list_objects(bucket, prefix).await {
        Ok(objects) => objects,
        Err(e) => {
            log_error(&mut stats, format!("cannot list {}/{}: {}", bucket, prefix, e));
            return stats;
        }
    };
    stats.total_objects_scanned = objects.len();
    tracing::info!(
        "backfill: {} objects under {}/{}",
        objects.len(),
        bucket,
        prefix
    );

    // ── STEP 2: Select sources without a thumbnail ────────────────────────────
    let existing: HashSet<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    let mut pending: Vec<String> = Vec::new();

    for object in &objects {
        let key = object.key.as_str();
        if keys::is_thumbnail_key(key) {
            stats.skipped_thumbnails += 1;
            continue;
        }
        if !is_supported_image_key(key) {
            stats.skipped_unsupported += 1;
            continue;
        }
        match keys::derive_thumbnail_key(key) {
            Ok(thumb) if existing.contains(thumb.as_str()) => stats.skipped_existing += 1,
            Ok(_) => pending.push(key.to_string()),
            Err(e) => log_error(&mut stats, e.to_string()),
        }
    }

    tracing::info!(
        "backfill: {} to generate, {} already have thumbnails",
        pending.len(),
        stats.skipped_existing
    );

    // ── STEP 3: Generate with bounded concurrency ─────────────────────────────
    let results: Vec<_> = stream::iter(pending)
        .map(|key| async move {
            let result = generator.generate(bucket, &key).await;
            (key, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (key, result) in results {
        match result {
            Ok(GenerateOutcome::Generated { .. }) => stats.generated += 1,
            Ok(GenerateOutcome::Skipped { .. }) => stats.skipped_thumbnails += 1,
            Err(e) => log_error(&mut stats, format!("{}: {}", key, e)),
        }
    }

    tracing::info!(
        "backfill: done, {} generated, {} errors",
        stats.generated,
        stats.errors
    );
    stats
}
