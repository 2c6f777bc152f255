use procwatch::block::{Block, BlockAssembler};
use procwatch::framer::StreamFramer;
use procwatch::model::ProcessModel;
use procwatch::protocol::decode;

const MB: u64 = 1_048_576;

fn block(lines: &[&str]) -> Block {
    lines.iter().filter_map(|line| decode(line)).collect()
}

fn model_from_stream(stream: &[u8], chunk_size: usize) -> ProcessModel {
    let mut framer = StreamFramer::new();
    let mut assembler = BlockAssembler::new();
    let mut model = ProcessModel::new();
    for chunk in stream.chunks(chunk_size) {
        for line in framer.feed(chunk) {
            if let Some(block) = assembler.push_line(&line) {
                model.apply(&block);
            }
        }
    }
    model
}

#[test]
fn test_tick_advances_once_per_block() {
    let mut model = ProcessModel::new();
    assert_eq!(model.tick(), 0);
    model.apply(&Block::new());
    model.apply(&block(&["new|pid=1|uss=10"]));
    model.apply(&Block::new());
    assert_eq!(model.tick(), 3);
}

#[test]
fn test_new_creates_record() {
    let mut model = ProcessModel::new();
    model.apply(&Block::new());
    let delta = model.apply(&block(&["new|pid=100|ppid=1|uss=1048576|name=b2g"]));
    assert_eq!(delta.tick, 2);
    assert_eq!(delta.started, vec![100]);

    let record = model.get(100).unwrap();
    assert_eq!(record.samples, vec![1.0]);
    assert_eq!(record.start_tick, 2);
    assert_eq!(record.name.as_deref(), Some("b2g"));
    assert_eq!(record.ppid, Some(1));
    assert!(!record.stopped);
}

#[test]
fn test_update_overwrites_last_sample() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=100|uss=1048576"]));
    model.apply(&block(&["update|pid=100|uss=2097152"]));

    let record = model.get(100).unwrap();
    assert_eq!(record.samples, vec![1.0, 2.0]);

    model.apply(&block(&["update|pid=100|uss=3145728"]));
    model.apply(&block(&["update|pid=100|uss=4194304"]));
    let record = model.get(100).unwrap();
    assert_eq!(record.samples, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_update_in_same_block_keeps_length() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=100|uss=1048576", "update|pid=100|uss=2097152"]));
    assert_eq!(model.get(100).unwrap().samples, vec![2.0]);
}

#[test]
fn test_active_series_track_the_tick() {
    let mut model = ProcessModel::new();
    model.apply(&Block::new());
    model.apply(&block(&["new|pid=1|uss=1048576"]));
    for _ in 0..5 {
        model.apply(&Block::new());
    }
    let record = model.get(1).unwrap();
    assert_eq!(record.samples, vec![1.0; 6]);
    assert_eq!(record.latest_tick(), Some(model.tick()));
    assert_eq!(record.series().last(), Some((7, 1.0)));
}

#[test]
fn test_old_freezes_series() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=100|uss=1048576"]));
    model.apply(&block(&["update|pid=100|uss=2097152"]));
    let delta = model.apply(&block(&["old|pid=100"]));
    assert_eq!(delta.stopped, vec![100]);

    let record = model.get(100).unwrap();
    assert!(record.stopped);
    assert_eq!(record.stop_tick, Some(3));
    assert_eq!(record.samples, vec![1.0, 2.0]);
    assert_eq!(record.latest_tick(), Some(2));

    model.apply(&Block::new());
    model.apply(&block(&["update|pid=100|uss=9437184"]));
    assert_eq!(model.get(100).unwrap().samples, vec![1.0, 2.0]);
    assert_eq!(model.active().count(), 0);
    assert_eq!(model.len(), 1);
}

#[test]
fn test_duplicate_new_and_old_are_noops() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=7|uss=1048576|name=first"]));
    let delta = model.apply(&block(&["new|pid=7|uss=5242880|name=second"]));
    assert!(delta.started.is_empty());
    let record = model.get(7).unwrap();
    assert_eq!(record.samples, vec![1.0, 1.0]);
    assert_eq!(record.name.as_deref(), Some("first"));

    model.apply(&block(&["old|pid=7"]));
    let before = model.get(7).unwrap().clone();
    let delta = model.apply(&block(&["old|pid=7"]));
    assert!(delta.stopped.is_empty());
    assert_eq!(model.get(7), Some(&before));
}

#[test]
fn test_events_for_unknown_pids_are_noops() {
    let mut model = ProcessModel::new();
    let delta = model.apply(&block(&["update|pid=3|uss=10", "old|pid=4"]));
    assert!(delta.is_empty());
    assert!(model.is_empty());
}

#[test]
fn test_events_missing_required_fields_are_noops() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=3", "new|uss=10", "old|name=x"]));
    assert!(model.is_empty());

    model.apply(&block(&["new|pid=3|uss=1048576"]));
    model.apply(&block(&["update|pid=3|name=renamed"]));
    let record = model.get(3).unwrap();
    assert_eq!(record.samples, vec![1.0, 1.0]);
    assert_eq!(record.name, None);
}

#[test]
fn test_update_renames_process() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=3|uss=1048576|name=b2g"]));
    let delta = model.apply(&block(&["update|pid=3|uss=1048576|name=Homescreen|app"]));
    assert_eq!(delta.renamed, vec![3]);
    assert_eq!(model.get(3).unwrap().name.as_deref(), Some("Homescreen app"));
}

#[test]
fn test_new_and_old_in_same_block() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=9|uss=1048576", "old|pid=9"]));
    let record = model.get(9).unwrap();
    assert!(record.stopped);
    assert!(record.samples.is_empty());
    assert_eq!(record.latest_tick(), None);
    model.apply(&Block::new());
    assert!(model.get(9).unwrap().samples.is_empty());
}

#[test]
fn test_summaries() {
    let mut model = ProcessModel::new();
    model.apply(&block(&["new|pid=1|uss=1048576", "new|pid=2|uss=3145728"]));
    model.apply(&block(&["update|pid=2|uss=2097152"]));
    assert_eq!(model.total_active_mb(), 3.0);
    assert_eq!(model.peak_mb(), Some(3.0));
    model.apply(&block(&["old|pid=2"]));
    assert_eq!(model.total_active_mb(), 1.0);
}

#[test]
fn test_chunk_boundaries_do_not_change_the_model() {
    let stream = format!(
        "noise before any block\n\
         >>>\nnew|pid=1|ppid=0|uss={a}|name=init\nnew|pid=42|uss={b}|name=Web|Content\n<<<\n\
         >>>\nupdate|pid=42|uss={c}\nbogus|pid=1\n<<<\n\
         >>>\n<<<\n\
         >>>\nnew|pid=43|uss={a}\n>>>\nold|pid=42\nnew|pid=44|uss={b}\n<<<\n\
         >>>\nupdate|pid=44|uss={c}|name=renamed\n<<<\n\
         >>>\nold|pid=1\nupd",
        a = MB,
        b = 2 * MB,
        c = 3 * MB
    );
    let bytes = stream.as_bytes();

    let whole = model_from_stream(bytes, bytes.len());
    for chunk_size in [1, 2, 3, 7, 64, 1024] {
        assert_eq!(model_from_stream(bytes, chunk_size), whole, "chunk size {}", chunk_size);
    }

    assert_eq!(whole.tick(), 5);
    assert!(whole.get(43).is_none());
    assert_eq!(whole.get(42).unwrap().name.as_deref(), Some("Web Content"));
    assert_eq!(whole.get(42).unwrap().samples, vec![2.0, 3.0, 3.0]);
    assert_eq!(whole.get(44).unwrap().samples, vec![2.0, 3.0]);
    assert!(!whole.get(1).unwrap().stopped);
}
