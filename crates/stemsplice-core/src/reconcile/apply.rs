//! Applying a plan to the timeline

use super::naming::{folder_track_name, stem_track_name};
use super::plan::{FoundStem, ReconciliationPlan, ResolvedJob};
use super::summary::ReconciliationSummary;
use super::{Disposition, OutputMode, ReconciliationError};
use crate::timeline::{Take, TimelineError, TimelineHost};
use crate::types::{ItemId, TimeRange, TrackId, TIME_EPSILON};

/// Name of the undo step created by [`reconcile`]
pub const EDIT_GROUP_NAME: &str = "Stem separation";

/// Apply a resolved plan inside one edit group
///
/// Jobs are applied in planner order. A timeline error stops the run; the
/// edit group is still closed so a single undo reverts the partial edits.
pub fn reconcile<H>(
    host: &mut H,
    plan: ReconciliationPlan,
) -> Result<ReconciliationSummary, ReconciliationError>
where
    H: TimelineHost + ?Sized,
{
    let mut summary = ReconciliationSummary {
        requested: plan.requested_count(),
        produced: plan.produced_count(),
        ..Default::default()
    };
    for job in &plan.jobs {
        summary
            .missing
            .extend(job.missing.iter().map(|m| (job.label.clone(), m.clone())));
    }

    log::info!(
        "reconcile: {} job(s), {} skipped, output {:?}",
        plan.jobs.len(),
        plan.skipped.len(),
        plan.output
    );
    host.begin_edit_group(EDIT_GROUP_NAME);
    let result = apply_plan(host, &plan, &mut summary);
    host.end_edit_group(EDIT_GROUP_NAME);
    if let Err(e) = result {
        log::error!("reconcile: Aborted: {}", e);
        return Err(e);
    }

    summary.skipped = plan.skipped;
    log::info!(
        "reconcile: {} ({} track(s), {} take(s) created)",
        summary,
        summary.tracks_created,
        summary.takes_created
    );
    Ok(summary)
}

fn apply_plan<H>(
    host: &mut H,
    plan: &ReconciliationPlan,
    summary: &mut ReconciliationSummary,
) -> Result<(), ReconciliationError>
where
    H: TimelineHost + ?Sized,
{
    let disposition = plan.output.disposition();
    let mut doomed_tracks: Vec<TrackId> = Vec::new();

    for job in &plan.jobs {
        log::debug!(
            "apply_plan: {} ({}) with {} stem(s)",
            job.id,
            job.label,
            job.found.len()
        );
        apply_disposition(host, job, disposition, summary)?;
        match plan.output {
            OutputMode::NewTracks { create_folder, .. } => {
                create_stem_tracks(host, job, create_folder, summary)?
            }
            OutputMode::InPlace => replace_in_place(host, job, summary)?,
        }
        if disposition == Disposition::DeleteTrack && !doomed_tracks.contains(&job.span.track) {
            doomed_tracks.push(job.span.track);
        }
    }

    // Highest index first so earlier deletions never shift later ones
    let mut doomed: Vec<(usize, TrackId)> = doomed_tracks
        .into_iter()
        .filter_map(|t| host.track_index(t).map(|i| (i, t)))
        .collect();
    doomed.sort_by(|a, b| b.0.cmp(&a.0));
    for (index, track) in doomed {
        log::info!("apply_plan: Deleting source track {} (index {})", track, index);
        host.delete_track(track)?;
        summary.tracks_deleted += 1;
    }
    Ok(())
}

/// Split `item` so that one segment covers exactly its overlap with `range`
///
/// Returns that segment, or `None` if the item lies wholly outside the
/// range. Boundaries at (or within [`TIME_EPSILON`] of) the item's edges
/// are not split, so an item wholly inside the range is returned unchanged.
pub fn isolate_range<H>(
    host: &mut H,
    item: ItemId,
    range: TimeRange,
) -> Result<Option<ItemId>, TimelineError>
where
    H: TimelineHost + ?Sized,
{
    let (position, end) = host
        .item(item)
        .map(|i| (i.position, i.end()))
        .ok_or(TimelineError::UnknownItem(item))?;
    if !range.overlaps(position, end) {
        return Ok(None);
    }

    let mut middle = item;
    if range.start > position + TIME_EPSILON {
        middle = host.split_item(item, range.start)?;
    }
    if range.end < end - TIME_EPSILON {
        host.split_item(middle, range.end)?;
    }
    Ok(Some(middle))
}

/// Span items that still exist
fn live_items<H>(host: &H, job: &ResolvedJob) -> Vec<ItemId>
where
    H: TimelineHost + ?Sized,
{
    job.span
        .items
        .iter()
        .copied()
        .filter(|id| {
            let exists = host.item(*id).is_some();
            if !exists {
                log::warn!("live_items: {} no longer has {}", job.id, id);
            }
            exists
        })
        .collect()
}

fn apply_disposition<H>(
    host: &mut H,
    job: &ResolvedJob,
    disposition: Disposition,
    summary: &mut ReconciliationSummary,
) -> Result<(), ReconciliationError>
where
    H: TimelineHost + ?Sized,
{
    if matches!(disposition, Disposition::None | Disposition::DeleteTrack) {
        return Ok(());
    }
    let range = job.span.extent();

    for id in live_items(host, job) {
        match disposition {
            Disposition::MuteAll => {
                host.set_item_muted(id, true)?;
                summary.items_muted += 1;
            }
            Disposition::DeleteAll => {
                host.delete_item(id)?;
                summary.items_deleted += 1;
            }
            Disposition::MuteRange => {
                if let Some(middle) = isolate_range(host, id, range)? {
                    host.set_item_muted(middle, true)?;
                    summary.items_muted += 1;
                }
            }
            Disposition::DeleteRange => {
                if let Some(middle) = isolate_range(host, id, range)? {
                    host.delete_item(middle)?;
                    summary.items_deleted += 1;
                }
            }
            Disposition::None | Disposition::DeleteTrack => {}
        }
    }
    log::debug!("apply_disposition: {} {} on {}", job.id, disposition, range);
    Ok(())
}

fn stem_take(stem: &FoundStem) -> Take {
    Take::new(stem.spec.name.clone(), stem.path.clone()).with_color(stem.spec.color)
}

fn create_stem_tracks<H>(
    host: &mut H,
    job: &ResolvedJob,
    create_folder: bool,
    summary: &mut ReconciliationSummary,
) -> Result<(), ReconciliationError>
where
    H: TimelineHost + ?Sized,
{
    let source = job.span.track;
    let mut index = host
        .track_index(source)
        .ok_or(TimelineError::UnknownTrack(source))?
        + 1;

    let folder = if create_folder {
        let folder = host.insert_track(index, &folder_track_name(&job.label))?;
        index += 1;
        summary.tracks_created += 1;
        Some(folder)
    } else {
        None
    };

    let single_stem = job.requested.len() == 1;
    for stem in &job.found {
        let name = stem_track_name(&job.label, &stem.spec.name, single_stem);
        let track = host.insert_track(index, &name)?;
        index += 1;
        host.set_track_color(track, stem.spec.color)?;
        if let Some(folder) = folder {
            host.set_track_parent(track, folder)?;
        }
        host.add_item(track, job.span.start, job.span.duration, stem_take(stem))?;
        summary.tracks_created += 1;
        summary.takes_created += 1;
    }
    Ok(())
}

fn replace_in_place<H>(
    host: &mut H,
    job: &ResolvedJob,
    summary: &mut ReconciliationSummary,
) -> Result<(), ReconciliationError>
where
    H: TimelineHost + ?Sized,
{
    let range = job.span.extent();
    for id in live_items(host, job) {
        if let Some(middle) = isolate_range(host, id, range)? {
            host.delete_item(middle)?;
            summary.items_deleted += 1;
        }
    }

    let mut stems = job.found.iter();
    let Some(first) = stems.next() else {
        return Ok(());
    };
    let item = host.add_item(job.span.track, job.span.start, job.span.duration, stem_take(first))?;
    summary.takes_created += 1;
    for stem in stems {
        host.add_take(item, stem_take(stem))?;
        summary.takes_created += 1;
    }
    host.set_active_take(item, 0)?;
    Ok(())
}
