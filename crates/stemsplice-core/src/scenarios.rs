//! End-to-end scenarios: timeline → batch → simulated workers → timeline

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::jobs::{prepare_batch, BatchMode, BatchRequest, ChunkProfile, Job, JobId, JobStatus};
use crate::orchestrator::{CancelToken, Orchestrator, OrchestratorError, TickOutcome};
use crate::pipeline::{run_separation, SeparationOptions, SeparationOutcome};
use crate::planner::Selection;
use crate::reconcile::{
    isolate_range, Disposition, OutputMode, ReconciliationError, ReconciliationPlan,
};
use crate::render::tests::write_test_wav;
use crate::render::WavRenderer;
use crate::stems::{ModelType, StemSettings};
use crate::timeline::{Take, Timeline, TimelineHost};
use crate::types::{ItemId, TimeRange, TrackId};
use crate::worker::{DispatchError, WorkerExit, WorkerLauncher, WorkerProcess};

/// Stands in for the separation worker: writes the requested stem files,
/// a final progress line and the done marker as soon as it is launched,
/// unless the job is listed in `hang`.
struct SimulatedLauncher {
    produce: Vec<&'static str>,
    hang: Vec<JobId>,
}

impl SimulatedLauncher {
    fn producing(keys: &[&'static str]) -> Self {
        Self {
            produce: keys.to_vec(),
            hang: Vec::new(),
        }
    }
}

struct SimulatedWorker {
    marker: PathBuf,
}

impl WorkerProcess for SimulatedWorker {
    fn poll_exit(&mut self) -> io::Result<Option<WorkerExit>> {
        Ok(self.marker.exists().then_some(WorkerExit { code: Some(0) }))
    }

    fn terminate(&mut self) -> io::Result<()> {
        std::fs::write(&self.marker, "terminated\n")
    }
}

impl WorkerLauncher for SimulatedLauncher {
    fn launch(&mut self, job: &Job) -> Result<Box<dyn WorkerProcess>, DispatchError> {
        let layout = job.layout();
        let mut progress = String::from("PROGRESS:5:Loading model\n");
        if !self.hang.contains(&job.id()) {
            for key in &self.produce {
                std::fs::copy(&layout.input, layout.output_dir.join(format!("{}.wav", key)))
                    .unwrap();
            }
            progress.push_str("PROGRESS:100:Complete\n");
            std::fs::write(&layout.done_marker, "exit=0\n").unwrap();
        }
        std::fs::write(&layout.progress, progress).unwrap();
        Ok(Box::new(SimulatedWorker {
            marker: layout.done_marker.clone(),
        }))
    }
}

struct Session {
    dir: tempfile::TempDir,
    timeline: Timeline,
    source: PathBuf,
}

impl Session {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.wav");
        write_test_wav(&source, 12.0, 8000);
        Self {
            dir,
            timeline: Timeline::new(),
            source,
        }
    }

    fn item(&mut self, track: TrackId, position: f64, length: f64) -> ItemId {
        self.timeline
            .add_item(track, position, length, Take::new("source", &self.source))
            .unwrap()
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.path().join("jobs")
    }
}

fn request<'a>(
    stems: &'a StemSettings,
    work_dir: &Path,
    selection: Selection,
    mode: BatchMode,
) -> BatchRequest<'a> {
    BatchRequest {
        selection,
        mode,
        stems,
        model: ModelType::HtDemucs,
        chunk: ChunkProfile::default(),
        work_dir: work_dir.to_path_buf(),
    }
}

fn options(output: OutputMode) -> SeparationOptions {
    SeparationOptions {
        output,
        timeout: Duration::from_secs(600),
        poll_interval: Duration::from_millis(1),
        media_dir: None,
    }
}

fn completed(outcome: SeparationOutcome) -> crate::reconcile::ReconciliationSummary {
    match outcome {
        SeparationOutcome::Completed(summary) => summary,
        SeparationOutcome::Cancelled => panic!("unexpected cancel"),
    }
}

const ALL_STEMS: &[&str] = &["vocals", "drums", "bass", "other"];

#[test]
fn test_scenario_a_one_item_four_stems_new_tracks() {
    let mut s = Session::new();
    let track = s.timeline.add_track("Song");
    let item = s.item(track, 2.0, 4.0);
    let original = s.timeline.item(item).cloned().unwrap();

    let stems = StemSettings::default();
    let req = request(&stems, &s.work_dir(), Selection::items([item]), BatchMode::Sequential);
    let output = OutputMode::NewTracks {
        create_folder: false,
        disposition: Disposition::None,
    };
    let summary = completed(
        run_separation(
            &mut s.timeline,
            &WavRenderer::new(),
            SimulatedLauncher::producing(ALL_STEMS),
            &req,
            &options(output),
            CancelToken::new(),
            |_| {},
        )
        .unwrap(),
    );

    assert_eq!(summary.to_string(), "4/4 stems produced");
    assert_eq!(summary.tracks_created, 4);
    let names: Vec<&str> = s.timeline.tracks().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Song", "Song - Vocals", "Song - Drums", "Song - Bass", "Song - Other"]
    );
    for stem_track in &s.timeline.tracks()[1..] {
        let items = s.timeline.items_on_track(stem_track.id);
        assert_eq!(items.len(), 1);
        let stem_item = s.timeline.item(items[0]).unwrap();
        assert_eq!((stem_item.position, stem_item.length), (2.0, 4.0));
        assert_eq!(stem_track.color, stem_item.takes[0].color);
        assert!(stem_item.takes[0].source.is_file());
    }
    assert_eq!(s.timeline.item(item), Some(&original));
}

#[test]
fn test_scenario_b_half_item_two_stems_in_place() {
    let mut s = Session::new();
    let track = s.timeline.add_track("Song");
    let item = s.item(track, 0.0, 8.0);

    let mut stems = StemSettings::default();
    stems.select_only(&["Vocals", "Drums"]);
    let range = TimeRange::new(2.0, 6.0).unwrap();
    let req = request(
        &stems,
        &s.work_dir(),
        Selection::items([item]).with_range(range),
        BatchMode::Parallel,
    );
    let summary = completed(
        run_separation(
            &mut s.timeline,
            &WavRenderer::new(),
            SimulatedLauncher::producing(ALL_STEMS),
            &req,
            &options(OutputMode::InPlace),
            CancelToken::new(),
            |_| {},
        )
        .unwrap(),
    );
    assert_eq!(summary.to_string(), "2/2 stems produced");

    let ids = s.timeline.items_on_track(track);
    assert_eq!(ids.len(), 3);
    let segments: Vec<_> = ids.iter().map(|id| s.timeline.item(*id).unwrap()).collect();

    // Left and right keep the original source at the right offsets
    assert_eq!((segments[0].position, segments[0].length), (0.0, 2.0));
    assert_eq!(segments[0].takes[0].source, s.source);
    assert!(!segments[0].muted);
    assert_eq!((segments[2].position, segments[2].length), (6.0, 2.0));
    assert_eq!(segments[2].takes[0].source_offset, 6.0);
    assert!(!segments[2].muted);

    let middle = segments[1];
    assert_eq!((middle.position, middle.length), (2.0, 4.0));
    let takes: Vec<&str> = middle.takes.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(takes, vec!["Vocals", "Drums"]);
    assert_eq!(middle.active_take, 0);
    assert_eq!(s.timeline.tracks().len(), 1);
}

#[test]
fn test_scenario_c_sequential_timeout_skips_reconciliation() {
    let mut s = Session::new();
    for name in ["One", "Two", "Three"] {
        let track = s.timeline.add_track(name);
        s.item(track, 0.0, 2.0);
    }
    let before = s.timeline.clone();

    let stems = StemSettings::default();
    let tracks = s.timeline.track_ids();
    let req = request(&stems, &s.work_dir(), Selection::tracks(tracks), BatchMode::Sequential);
    let batch = prepare_batch(&s.timeline, &WavRenderer::new(), &req).unwrap();
    let launcher = SimulatedLauncher {
        produce: ALL_STEMS.to_vec(),
        hang: vec![JobId(2)],
    };
    let mut orch = Orchestrator::new(batch, launcher, Duration::from_secs(600));

    let t0 = Instant::now();
    let mut now = t0;
    let err = loop {
        match orch.tick(now) {
            Ok(TickOutcome::InProgress(progress)) => {
                assert!(progress.running <= 1);
                now += Duration::from_secs(30);
            }
            Ok(other) => panic!("unexpected outcome {:?}", other),
            Err(e) => break e,
        }
    };

    assert_eq!(now - t0, Duration::from_secs(600));
    assert!(matches!(
        err,
        OrchestratorError::Timeout(ref t) if t.unfinished == vec![JobId(2), JobId(3)]
    ));
    let statuses: Vec<JobStatus> = orch.batch().jobs().iter().map(|j| j.status()).collect();
    assert_eq!(statuses, vec![JobStatus::Done, JobStatus::Failed, JobStatus::Failed]);

    let output = OutputMode::NewTracks {
        create_folder: false,
        disposition: Disposition::DeleteAll,
    };
    assert!(matches!(
        ReconciliationPlan::resolve(orch.batch(), output, None),
        Err(ReconciliationError::BatchNotDone { .. })
    ));
    assert_eq!(s.timeline.tracks(), before.tracks());
    assert_eq!(s.timeline.items(), before.items());
}

#[test]
fn test_scenario_d_missing_stems_are_reported() {
    let mut s = Session::new();
    let track = s.timeline.add_track("Song");
    let sibling_track = s.timeline.add_track("Sibling");
    let item = s.item(track, 0.0, 4.0);
    let same_track_sibling = s.item(track, 6.0, 2.0);
    let other_track_sibling = s.item(sibling_track, 0.0, 4.0);
    let untouched: Vec<_> = [same_track_sibling, other_track_sibling]
        .iter()
        .map(|id| s.timeline.item(*id).cloned().unwrap())
        .collect();

    let stems = StemSettings::default();
    let req = request(&stems, &s.work_dir(), Selection::items([item]), BatchMode::Sequential);
    let output = OutputMode::NewTracks {
        create_folder: false,
        disposition: Disposition::MuteAll,
    };
    let summary = completed(
        run_separation(
            &mut s.timeline,
            &WavRenderer::new(),
            SimulatedLauncher::producing(&["vocals", "bass"]),
            &req,
            &options(output),
            CancelToken::new(),
            |_| {},
        )
        .unwrap(),
    );

    assert_eq!(summary.to_string(), "2/4 stems produced");
    assert_eq!(summary.tracks_created, 2);
    assert_eq!(summary.takes_created, 2);
    let missing: Vec<&str> = summary.missing.iter().map(|(_, stem)| stem.as_str()).collect();
    assert_eq!(missing, vec!["Drums", "Other"]);

    assert!(s.timeline.item(item).unwrap().muted);
    for before in &untouched {
        assert_eq!(s.timeline.item(before.id), Some(before));
    }
}

#[test]
fn test_cancel_leaves_timeline_untouched() {
    let mut s = Session::new();
    let track = s.timeline.add_track("Song");
    s.item(track, 0.0, 4.0);
    let before = s.timeline.clone();

    let stems = StemSettings::default();
    let req = request(&stems, &s.work_dir(), Selection::tracks([track]), BatchMode::Parallel);
    let cancel = CancelToken::new();
    let launcher = SimulatedLauncher {
        produce: ALL_STEMS.to_vec(),
        hang: vec![JobId(1)],
    };
    let token = cancel.clone();
    let outcome = run_separation(
        &mut s.timeline,
        &WavRenderer::new(),
        launcher,
        &req,
        &options(OutputMode::InPlace),
        cancel,
        move |_| token.cancel(),
    )
    .unwrap();

    assert!(matches!(outcome, SeparationOutcome::Cancelled));
    assert_eq!(s.timeline.items(), before.items());
    assert_eq!(s.timeline.undo_depth(), 0);
}

#[test]
fn test_split_segments_sum_to_original_length() {
    for (start, end) in [(1.0, 3.0), (0.0, 3.0), (5.0, 9.0), (-2.0, 20.0), (2.5, 2.75)] {
        let mut timeline = Timeline::new();
        let track = timeline.add_track("T");
        let item = timeline.add_item(track, 0.0, 8.0, Take::new("t", "t.wav")).unwrap();
        let range = TimeRange::new(start, end).unwrap();

        isolate_range(&mut timeline, item, range).unwrap();
        let total: f64 = timeline.items().iter().map(|i| i.length).sum();
        assert!((total - 8.0).abs() < 1e-9, "{:?}", range);
        assert!(timeline.items().iter().all(|i| i.length > 0.0));
    }
}
