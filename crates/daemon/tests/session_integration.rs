//! End-to-end tests for diskbridge sessions.
//!
//! These tests drive complete command sequences through the public API:
//! - Disk, partition and file listing
//! - Selection and its resets
//! - Chunked file streaming and staging cleanup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use daemon::channel::{Channel, ChannelError, ScriptedChannel};
use daemon::engine::{Dispatcher, Request, Response, Selection};
use daemon::files::FileStreamer;
use daemon::session::{Session, SessionEnd, SessionOptions, SessionReport};
use daemon::storage::{
    enumerator::list_directory, Capacity, EnumerationError, ListedEntry, StorageAdapter,
    StorageEnumerator,
};
use protocol::{BoundedName, CommandByte, CHUNK_SIZE, NAME_FRAME_LEN};
use tempfile::TempDir;

/// Enumerator with a fixed disk and partition layout.
#[derive(Clone, Default)]
struct Layout {
    disks: Vec<(String, Vec<String>)>,
    failing: Arc<AtomicBool>,
}

impl Layout {
    fn disk(mut self, name: &str, partitions: &[&str]) -> Self {
        self.disks.push((
            name.to_string(),
            partitions.iter().map(|p| p.to_string()).collect(),
        ));
        self
    }
}

impl StorageEnumerator for Layout {
    fn disk_names(&self) -> Result<Vec<String>, EnumerationError> {
        Ok(self.disks.iter().map(|(name, _)| name.clone()).collect())
    }

    fn partition_names(&self, disk: &str) -> Result<Vec<String>, EnumerationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnumerationError::CommandFailed {
                command: format!("lsblk -ln -o NAME /dev/{disk}"),
                stderr: "device busy".to_string(),
            });
        }
        Ok(self
            .disks
            .iter()
            .find(|(name, _)| name == disk)
            .map(|(_, partitions)| partitions.clone())
            .unwrap_or_default())
    }

    fn directory_entries(&self, dir: &Path) -> Result<Vec<ListedEntry>, EnumerationError> {
        let mut entries = list_directory(dir)?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// A scratch host: mount points under `mnt/`, staging under `staging/`.
struct Host {
    temp: TempDir,
    layout: Layout,
    capacity: Capacity,
}

impl Host {
    fn new(layout: Layout) -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            layout,
            capacity: Capacity::default(),
        }
    }

    fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    fn mount_prefix(&self) -> PathBuf {
        self.temp.path().join("mnt")
    }

    fn staging(&self) -> PathBuf {
        self.temp.path().join("staging")
    }

    fn write_file(&self, partition: &str, name: &str, content: &[u8]) -> PathBuf {
        let dir = self.mount_prefix().join(partition);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn dispatcher(&self) -> Dispatcher<Layout> {
        let adapter = StorageAdapter::new(self.layout.clone(), self.mount_prefix());
        Dispatcher::new(adapter, self.capacity)
    }

    fn run<C: Channel>(&self, channel: C) -> SessionReport {
        Session::new(
            channel,
            self.dispatcher(),
            FileStreamer::new(self.staging()),
            SessionOptions::default(),
        )
        .run()
    }
}

fn select(channel: ScriptedChannel, name: &str) -> ScriptedChannel {
    channel
        .command(CommandByte::Select)
        .push(name.as_bytes().to_vec())
}

fn frame(name: &str) -> Vec<u8> {
    BoundedName::new(name).unwrap().to_frame().as_bytes().to_vec()
}

fn frames(names: &[&str]) -> Vec<u8> {
    names.iter().flat_map(|name| frame(name)).collect()
}

fn staging_is_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

fn standard_layout() -> Layout {
    Layout::default()
        .disk("sda", &["sda1"])
        .disk("sdb", &["sdb1"])
}

// =============================================================================
// Browsing
// =============================================================================

#[test]
fn test_browse_and_read_one_file() {
    let host = Host::new(standard_layout());
    host.write_file("sdb1", "a.txt", b"0123456789");

    let channel = ScriptedChannel::new().command(CommandByte::Name);
    let channel = select(channel, "sdb").command(CommandByte::Part);
    let mut channel = select(channel, "sdb1")
        .command(CommandByte::File)
        .command(CommandByte::Read);

    let report = host.run(&mut channel);

    let mut expected = frames(&["sda", "sdb", "sdb1", "a.txt"]);
    expected.extend_from_slice(b"0123456789");
    assert_eq!(channel.sent(), expected.as_slice());

    assert_eq!(report.commands, 6);
    assert_eq!(report.files_streamed, 1);
    assert_eq!(report.bytes_streamed, 10);
    assert_eq!(report.end, SessionEnd::Disconnected);
    assert!(staging_is_empty(&host.staging()));
}

#[test]
fn test_echoed_frame_selects_disk() {
    let host = Host::new(standard_layout());

    let mut channel = ScriptedChannel::new()
        .command(CommandByte::Select)
        .push(frame("sda"))
        .command(CommandByte::Part);

    host.run(&mut channel);

    assert_eq!(channel.sent(), frame("sda1").as_slice());
}

#[test]
fn test_commands_without_selection_send_nothing() {
    let host = Host::new(standard_layout());
    host.write_file("sdb1", "a.txt", b"data");

    let mut channel = ScriptedChannel::new()
        .command(CommandByte::Part)
        .command(CommandByte::File)
        .command(CommandByte::Read)
        .command(CommandByte::Unselect);

    let report = host.run(&mut channel);

    assert!(channel.sent().is_empty());
    assert_eq!(report.commands, 4);
}

#[test]
fn test_reserved_and_unknown_bytes_are_ignored() {
    let host = Host::new(standard_layout());

    let mut channel = ScriptedChannel::new()
        .command(CommandByte::Ret)
        .push(vec![0x99])
        .command(CommandByte::Name);

    let report = host.run(&mut channel);

    assert_eq!(channel.sent(), frames(&["sda", "sdb"]).as_slice());
    assert_eq!(report.commands, 3);
}

// =============================================================================
// Selection resets
// =============================================================================

#[test]
fn test_overlong_select_resets_selection() {
    let host = Host::new(standard_layout());
    host.write_file("sdb1", "a.txt", b"data");

    let channel = select(ScriptedChannel::new(), "sdb");
    let mut channel = select(channel, "sdb1")
        .command(CommandByte::Select)
        .push(vec![b'x'; NAME_FRAME_LEN])
        .command(CommandByte::Read)
        .command(CommandByte::Part);

    let report = host.run(&mut channel);

    assert!(channel.sent().is_empty());
    assert_eq!(report.files_streamed, 0);
}

#[test]
fn test_partition_of_other_disk_is_not_selectable() {
    let host = Host::new(standard_layout());
    host.write_file("sdb1", "a.txt", b"data");

    let channel = select(ScriptedChannel::new(), "sda");
    let mut channel = select(channel, "sdb1").command(CommandByte::File);

    host.run(&mut channel);

    assert!(channel.sent().is_empty());
}

#[test]
fn test_unselect_then_part_sends_nothing() {
    let host = Host::new(standard_layout());

    let mut channel = select(ScriptedChannel::new(), "sdb")
        .command(CommandByte::Unselect)
        .command(CommandByte::Part);

    host.run(&mut channel);

    assert!(channel.sent().is_empty());
}

#[test]
fn test_partition_enumeration_failure_keeps_selection() {
    let layout = standard_layout();
    let host = Host::new(layout.clone());
    let mut dispatcher = host.dispatcher();
    let mut selection = Selection::None;
    dispatcher.refresh(&mut selection).unwrap();

    dispatcher.dispatch(&mut selection, Request::Select(b"sdb".to_vec()));
    let disk = selection.disk().unwrap();

    layout.failing.store(true, Ordering::SeqCst);
    let response = dispatcher.dispatch(&mut selection, Request::Part);

    assert!(response.is_empty());
    assert_eq!(selection, Selection::Disk(disk));
    assert!(!dispatcher.model().disk(disk).unwrap().partitions_loaded());

    layout.failing.store(false, Ordering::SeqCst);
    match dispatcher.dispatch(&mut selection, Request::Part) {
        Response::Names(names) => {
            let names: Vec<&str> = names.iter().map(|f| f.name()).collect();
            assert_eq!(names, ["sdb1"]);
        }
        other => panic!("expected names, got {other:?}"),
    }
}

// =============================================================================
// Capacity
// =============================================================================

#[test]
fn test_capacity_overflow_truncates_listing() {
    let layout = Layout::default().disk("sdb", &["sdb1", "sdb2", "sdb3"]);
    let host = Host::new(layout).with_capacity(Capacity {
        max_partitions: 2,
        max_files: 1,
    });
    host.write_file("sdb1", "a.txt", b"first");
    host.write_file("sdb1", "b.txt", b"second");

    let channel = select(ScriptedChannel::new(), "sdb").command(CommandByte::Part);
    let channel = select(channel, "sdb3").command(CommandByte::Part);
    let channel = select(channel, "sdb");
    let mut channel = select(channel, "sdb1")
        .command(CommandByte::File)
        .command(CommandByte::Read);

    let report = host.run(&mut channel);

    let mut expected = frames(&["sdb1", "sdb2"]);
    expected.extend(frame("a.txt"));
    expected.extend_from_slice(b"first");
    assert_eq!(channel.sent(), expected.as_slice());
    assert_eq!(report.files_streamed, 1);
}

// =============================================================================
// Streaming
// =============================================================================

#[test]
fn test_chunk_boundaries_on_the_wire() {
    let host = Host::new(standard_layout());
    let full: Vec<u8> = (0..CHUNK_SIZE).map(|i| (i % 256) as u8).collect();
    let over: Vec<u8> = (0..CHUNK_SIZE + 1).map(|i| (i % 7) as u8).collect();
    host.write_file("sdb1", "a_full.bin", &full);
    host.write_file("sdb1", "b_over.bin", &over);

    let channel = select(ScriptedChannel::new(), "sdb");
    let mut channel = select(channel, "sdb1").command(CommandByte::Read);

    let report = host.run(&mut channel);

    let sent = channel.sent();
    assert_eq!(sent.len(), 2 * CHUNK_SIZE + 1);
    assert_eq!(&sent[..CHUNK_SIZE], full.as_slice());
    assert_eq!(&sent[CHUNK_SIZE..], over.as_slice());
    assert_eq!(report.files_streamed, 2);
    assert_eq!(report.bytes_streamed, (2 * CHUNK_SIZE + 1) as u64);
}

/// Removes a file from disk as soon as the READ command byte is received.
struct RemoveOnRead {
    inner: ScriptedChannel,
    victim: PathBuf,
}

impl Channel for RemoveOnRead {
    fn send(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        self.inner.send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let n = self.inner.recv(buf)?;
        if n == 1 && buf[0] == u8::from(CommandByte::Read) {
            fs::remove_file(&self.victim).unwrap();
        }
        Ok(n)
    }
}

#[test]
fn test_missing_file_is_skipped_during_read() {
    let host = Host::new(standard_layout());
    host.write_file("sdb1", "a.txt", b"alpha");
    let victim = host.write_file("sdb1", "b.txt", b"bravo");
    host.write_file("sdb1", "c.txt", b"charlie");

    let channel = select(ScriptedChannel::new(), "sdb");
    let channel = select(channel, "sdb1")
        .command(CommandByte::File)
        .command(CommandByte::Read);
    let mut channel = RemoveOnRead {
        inner: channel,
        victim,
    };

    let report = host.run(&mut channel);

    let mut expected = frames(&["a.txt", "b.txt", "c.txt"]);
    expected.extend_from_slice(b"alpha");
    expected.extend_from_slice(b"charlie");
    assert_eq!(channel.inner.sent(), expected.as_slice());
    assert_eq!(report.files_streamed, 2);
    assert_eq!(report.end, SessionEnd::Disconnected);
    assert!(staging_is_empty(&host.staging()));
}

#[test]
fn test_peer_reset_mid_stream_ends_session() {
    let host = Host::new(standard_layout());
    host.write_file("sdb1", "big.bin", &vec![3u8; 4 * CHUNK_SIZE]);

    let channel = select(ScriptedChannel::new(), "sdb");
    let channel = select(channel, "sdb1")
        .command(CommandByte::Read)
        .command(CommandByte::Name);
    let mut channel = channel.fail_sends_after(CHUNK_SIZE + 10);

    let report = host.run(&mut channel);

    assert_eq!(report.end, SessionEnd::Disconnected);
    assert_eq!(report.files_streamed, 0);
    assert_eq!(channel.sent().len(), CHUNK_SIZE + 10);
    assert!(!channel.is_drained());
    assert!(staging_is_empty(&host.staging()));
}
