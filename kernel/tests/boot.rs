//! Boot sequence tests against an emulated serial terminal and in-memory
//! collaborators.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;

use khal::mock::MockSerial;
use khal::{Dimensions, SerialError, SerialTermConfig, TermError, TerminalRegistry, term_serial};
use log::{Level, LevelFilter, Log, Metadata, Record};
use sysx_kernel::{
    BootConfig, BootError, BootHooks, BootSequencer, BootStage, DirEntry, FileSystem, LoadError,
    MemoryManager, Node, NodeFlags, SymbolLoad, SymbolLoader, SymbolTable, Target, TargetError,
};

// -----------------------------------------------------------------------------
// Log capture
// -----------------------------------------------------------------------------

thread_local! {
    static LINES: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        LINES.with(|lines| {
            lines
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;
static INSTALL: Once = Once::new();

fn capture_logs() {
    INSTALL.call_once(|| {
        log::set_logger(&CAPTURE).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
    LINES.with(|lines| lines.borrow_mut().clear());
}

fn logged() -> Vec<(Level, String)> {
    LINES.with(|lines| lines.borrow().clone())
}

fn logged_line(text: &str) -> bool {
    logged().iter().any(|(_, line)| line == text)
}

// -----------------------------------------------------------------------------
// Collaborators
// -----------------------------------------------------------------------------

type Events = Rc<RefCell<Vec<&'static str>>>;

struct FakeMemory {
    events: Events,
}

impl MemoryManager for FakeMemory {
    fn init_physical(&mut self) {
        self.events.borrow_mut().push("pmm");
    }

    fn init_virtual(&mut self) {
        self.events.borrow_mut().push("vmm");
    }
}

struct FakeTarget {
    events: Events,
    result: Result<(), TargetError>,
}

impl Target for FakeTarget {
    fn init(&mut self) -> Result<(), TargetError> {
        self.events.borrow_mut().push("target");
        self.result
    }
}

/// `/boot/kernel.sym` and `/readme`, optionally without the symbol file or
/// without anything mounted.
struct FlatFs {
    mounted: bool,
    entries: Vec<(u64, Node)>,
    reads: Cell<usize>,
}

impl FlatFs {
    fn new() -> Self {
        Self {
            mounted: true,
            entries: vec![
                (1, node("boot", 2, NodeFlags::DIRECTORY, 0)),
                (2, node("kernel.sym", 3, NodeFlags::FILE, 4096)),
                (1, node("readme", 4, NodeFlags::FILE, 12)),
            ],
            reads: Cell::new(0),
        }
    }

    fn without_symbols() -> Self {
        let mut fs = Self::new();
        fs.entries.retain(|(_, n)| n.name != "kernel.sym");
        fs
    }

    fn unmounted() -> Self {
        Self {
            mounted: false,
            ..Self::new()
        }
    }

    fn children(&self, dir: &Node) -> impl Iterator<Item = &Node> {
        let parent = dir.ino;
        self.entries
            .iter()
            .filter(move |(p, _)| *p == parent)
            .map(|(_, n)| n)
    }
}

fn node(name: &str, ino: u64, flags: NodeFlags, length: u64) -> Node {
    Node {
        name: name.to_string(),
        ino,
        flags,
        length,
    }
}

impl FileSystem for FlatFs {
    fn root(&self) -> Option<Node> {
        self.mounted.then(|| node("/", 1, NodeFlags::DIRECTORY, 0))
    }

    fn read_dir(&self, dir: &Node, index: usize) -> Option<DirEntry> {
        self.reads.set(self.reads.get() + 1);
        self.children(dir).nth(index).map(|n| DirEntry {
            ino: n.ino,
            name: n.name.clone(),
        })
    }

    fn find_dir(&self, dir: &Node, name: &str) -> Option<Node> {
        self.children(dir).find(|n| n.name == name).cloned()
    }

    fn traverse_path(&self, path: &str) -> Option<Node> {
        let mut current = self.root()?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self.find_dir(&current, part)?;
        }
        Some(current)
    }
}

struct FakeLoader {
    result: Result<(), LoadError>,
    calls: Vec<(String, String)>,
}

impl FakeLoader {
    fn ok() -> Self {
        Self {
            result: Ok(()),
            calls: Vec::new(),
        }
    }

    fn failing(err: LoadError) -> Self {
        Self {
            result: Err(err),
            calls: Vec::new(),
        }
    }
}

impl SymbolLoader for FakeLoader {
    fn load(&mut self, node: &Node, entry: &str, symbols: &mut SymbolTable) -> Result<(), LoadError> {
        self.calls.push((node.name.clone(), entry.to_string()));
        self.result?;
        symbols.add(entry, 0xffff_8000_0010_0000);
        symbols.add("kmain", 0xffff_8000_0010_0400);
        Ok(())
    }
}

struct Rig {
    events: Events,
    memory: FakeMemory,
    target: FakeTarget,
    fs: FlatFs,
    loader: FakeLoader,
    wire: MockSerial,
    registry: TerminalRegistry,
}

impl Rig {
    fn new() -> Self {
        capture_logs();
        let events = Events::default();
        Self {
            memory: FakeMemory {
                events: events.clone(),
            },
            target: FakeTarget {
                events: events.clone(),
                result: Ok(()),
            },
            events,
            fs: FlatFs::new(),
            loader: FakeLoader::ok(),
            wire: MockSerial::new(80, 24),
            registry: TerminalRegistry::new(),
        }
    }

    /// Run boot with the serial terminal on the mock wire. Returns the
    /// report (or error) and the completed stages.
    fn boot(&mut self, config: BootConfig) -> (Result<sysx_kernel::BootReport, BootError>, Vec<BootStage>) {
        let wire = self.wire.clone();
        let events = self.events.clone();
        let mut hooks = BootHooks {
            memory: &mut self.memory,
            target: &mut self.target,
            fs: &self.fs,
            loader: &mut self.loader,
        };

        let mut sequencer = BootSequencer::new(config, &self.registry);
        let result = sequencer.run(
            |registry: &TerminalRegistry| {
                events.borrow_mut().push("terminal");
                term_serial::init(wire, &SerialTermConfig::DEFAULT, registry)
            },
            &mut hooks,
        );
        let stages = sequencer.completed().collect();
        (result, stages)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[test]
fn full_boot_runs_every_stage_in_order() {
    let mut rig = Rig::new();
    let (result, stages) = rig.boot(BootConfig::DEFAULT);
    let report = result.unwrap();

    assert_eq!(
        stages,
        [
            BootStage::TerminalBringup,
            BootStage::MemoryBringup,
            BootStage::TargetInit,
            BootStage::DimensionProbe,
            BootStage::FileSystemWalk,
            BootStage::SymbolTableLoad,
            BootStage::Idle,
        ]
    );
    assert_eq!(*rig.events.borrow(), ["terminal", "pmm", "vmm", "target"]);

    // 80x24 terminal, reported with one extra cell on each axis.
    assert_eq!(report.dimensions, Some(Dimensions { width: 81, height: 25 }));
    assert!(logged_line("terminal size: 81 x 25"));

    assert_eq!(report.entries_listed, 3);
    assert!(logged_line("ino 2:boot (0x02), size 0"));
    assert!(logged_line("ino 3:\tkernel.sym (0x01), size 4096"));
    assert!(logged_line("ino 4:readme (0x01), size 12"));

    assert_eq!(report.symbol_load, SymbolLoad::Loaded(2));
    assert_eq!(report.symbols.len(), 2);
    assert!(report.symbols.lookup("_init").is_some());
    assert_eq!(rig.loader.calls, [("kernel.sym".to_string(), "_init".to_string())]);
    assert!(logged_line("locating kernel symbols file at /boot/kernel.sym"));
    assert!(logged_line("2 symbol(s) have been added to kernel symbol pool"));

    assert!(logged().iter().all(|(level, _)| *level == Level::Info));
}

#[test]
fn banner_is_the_first_line_after_terminal_bring_up() {
    let mut rig = Rig::new();
    rig.boot(BootConfig::DEFAULT).0.unwrap();

    let lines = logged();
    assert!(lines[0].1.starts_with("SysX kernel "));
    assert!(lines[1].1.contains("physical memory"));
}

#[test]
fn memory_can_come_up_before_the_terminal() {
    let mut rig = Rig::new();
    let config = BootConfig {
        mm_first: true,
        ..BootConfig::DEFAULT
    };
    let (result, stages) = rig.boot(config);
    result.unwrap();

    assert_eq!(*rig.events.borrow(), ["pmm", "vmm", "terminal", "target"]);
    assert_eq!(&stages[..2], [BootStage::MemoryBringup, BootStage::TerminalBringup]);
    assert_eq!(stages.iter().filter(|s| **s == BootStage::MemoryBringup).count(), 1);
}

#[test]
fn target_failure_halts_boot() {
    let mut rig = Rig::new();
    rig.target.result = Err(TargetError { code: -5 });
    let (result, stages) = rig.boot(BootConfig::DEFAULT);

    assert_eq!(result.unwrap_err(), BootError::TargetInit(TargetError { code: -5 }));
    assert_eq!(stages, [BootStage::TerminalBringup, BootStage::MemoryBringup]);

    let lines = logged();
    let (level, last) = lines.last().unwrap();
    assert_eq!(*level, Level::Error);
    assert!(last.contains("halting"));

    // Nothing after target init ran.
    assert_eq!(rig.fs.reads.get(), 0);
    assert!(rig.loader.calls.is_empty());
    assert!(rig.wire.take_output().windows(4).all(|w| w != b"\x1b[6n"));
}

#[test]
fn missing_symbol_file_is_skipped() {
    let mut rig = Rig::new();
    rig.fs = FlatFs::without_symbols();
    let (result, stages) = rig.boot(BootConfig::DEFAULT);
    let report = result.unwrap();

    assert_eq!(report.symbol_load, SymbolLoad::NotFound);
    assert!(report.symbols.is_empty());
    assert!(report.symbols.capacity() >= BootConfig::DEFAULT.symbol_capacity);
    assert!(rig.loader.calls.is_empty());
    assert!(logged_line("cannot find kernel symbols file, skipping"));
    assert_eq!(stages.last(), Some(&BootStage::Idle));
}

#[test]
fn loader_failure_does_not_stop_boot() {
    let mut rig = Rig::new();
    rig.loader = FakeLoader::failing(LoadError::BadImage);
    let (result, stages) = rig.boot(BootConfig::DEFAULT);
    let report = result.unwrap();

    assert_eq!(report.symbol_load, SymbolLoad::Failed(LoadError::BadImage));
    assert!(report.symbols.is_empty());
    assert!(logged().iter().any(|(level, _)| *level == Level::Warn));
    assert_eq!(stages.last(), Some(&BootStage::Idle));
}

#[test]
fn terminal_failure_is_fatal() {
    let mut rig = Rig::new();
    rig.wire.fail_open(SerialError::LoopbackFailed);
    let (result, stages) = rig.boot(BootConfig::DEFAULT);

    assert_eq!(
        result.unwrap_err(),
        BootError::Terminal(TermError::Device(SerialError::LoopbackFailed))
    );
    assert!(stages.is_empty());
    assert!(rig.events.borrow().iter().all(|e| *e == "terminal"));
    assert!(!rig.registry.is_set());
}

#[test]
fn silent_terminal_with_a_budget_skips_the_size() {
    let mut rig = Rig::new();
    rig.wire.set_answering(false);
    let config = BootConfig {
        probe_budget: Some(64),
        ..BootConfig::DEFAULT
    };
    let (result, stages) = rig.boot(config);
    let report = result.unwrap();

    assert_eq!(report.dimensions, None);
    assert!(stages.contains(&BootStage::DimensionProbe));
    assert!(logged().iter().any(|(level, _)| *level == Level::Warn));
    assert_eq!(report.symbol_load, SymbolLoad::Loaded(2));
}

#[test]
fn probe_can_be_disabled() {
    let mut rig = Rig::new();
    let config = BootConfig {
        probe_dimensions: false,
        ..BootConfig::DEFAULT
    };
    let (result, stages) = rig.boot(config);

    assert_eq!(result.unwrap().dimensions, None);
    assert!(!stages.contains(&BootStage::DimensionProbe));
    // Only the clear sequence went out; no cursor traffic.
    assert_eq!(rig.wire.take_output(), b"\x1b[2J\x1b[H");
}

#[test]
fn unmounted_root_skips_the_listing() {
    let mut rig = Rig::new();
    rig.fs = FlatFs::unmounted();
    let (result, stages) = rig.boot(BootConfig::DEFAULT);
    let report = result.unwrap();

    assert_eq!(report.entries_listed, 0);
    assert_eq!(rig.fs.reads.get(), 0);
    assert_eq!(report.symbol_load, SymbolLoad::NotFound);
    assert!(stages.contains(&BootStage::FileSystemWalk));
}

#[test]
fn kinit_runs_a_fresh_sequence() {
    capture_logs();
    let registry = TerminalRegistry::new();
    let wire = MockSerial::new(132, 43);
    let mut memory = FakeMemory {
        events: Events::default(),
    };
    let mut target = FakeTarget {
        events: Events::default(),
        result: Ok(()),
    };
    let fs = FlatFs::new();
    let mut loader = FakeLoader::ok();
    let mut hooks = BootHooks {
        memory: &mut memory,
        target: &mut target,
        fs: &fs,
        loader: &mut loader,
    };

    let report = sysx_kernel::kinit(
        BootConfig::DEFAULT,
        &registry,
        |registry: &TerminalRegistry| term_serial::init(wire.clone(), &SerialTermConfig::DEFAULT, registry),
        &mut hooks,
    )
    .unwrap();
    assert_eq!(report.dimensions, Some(Dimensions { width: 133, height: 44 }));
}
