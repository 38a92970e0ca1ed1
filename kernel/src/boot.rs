// =============================================================================
// SysX - Boot Sequencer
// =============================================================================
//
// The one-time bring-up path. Stages, in order:
//
//   MemoryBringup   (here when `mm_first`)
//   TerminalBringup   select + open a terminal backend, fill the registry
//   MemoryBringup   (here otherwise)
//   TargetInit        board/arch hook; failure is FATAL
//   DimensionProbe    best-effort, informational
//   FileSystemWalk    log the mounted tree
//   SymbolTableLoad   best-effort; missing file is skipped
//   Idle
//
// There are no retries. A fatal step returns an error; the caller's
// bootstrap context parks the CPU.
//
// HEAP NOTE: the terminal registry boxes its backend, so when memory comes
// up after the terminal the image must provide a small early heap.
// =============================================================================

use core::fmt;

use khal::{Deadline, Dimensions, Forever, PollBudget, TermError, TerminalRegistry};

use crate::arch::{Target, TargetError};
use crate::exec::{LoadError, SymbolLoader, SymbolTable};
use crate::fs::{FileSystem, vfs};
use crate::memory::MemoryManager;

/// Knobs for the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Bring up memory management before the terminal.
    pub mm_first: bool,
    /// Ask the terminal for its size after target init.
    pub probe_dimensions: bool,
    /// Idle polls the size probe may wait for each reply. `None` waits
    /// forever, which hangs boot on a terminal that never answers.
    pub probe_budget: Option<u64>,
    /// Where the kernel symbol file lives.
    pub symbol_path: &'static str,
    /// Initial size of the kernel symbol table.
    pub symbol_capacity: usize,
    /// Entry symbol handed to the loader.
    pub entry_symbol: &'static str,
}

impl BootConfig {
    pub const DEFAULT: Self = Self {
        mm_first: false,
        probe_dimensions: true,
        probe_budget: None,
        symbol_path: "/boot/kernel.sym",
        symbol_capacity: 8,
        entry_symbol: "_init",
    };
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Boot stages, in the order they can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    MemoryBringup,
    TerminalBringup,
    TargetInit,
    DimensionProbe,
    FileSystemWalk,
    SymbolTableLoad,
    Idle,
}

const STAGE_COUNT: usize = 7;

/// Fatal boot failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// No terminal could be brought up.
    Terminal(TermError),
    /// The target's init hook failed.
    TargetInit(TargetError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Terminal(err) => write!(f, "terminal bring-up failed: {}", err),
            BootError::TargetInit(err) => write!(f, "target init failed: {}", err),
        }
    }
}

/// Outcome of the symbol table stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLoad {
    /// The loader ran; this many symbols are now in the table.
    Loaded(usize),
    /// Nothing at the configured path.
    NotFound,
    /// The loader rejected the file.
    Failed(LoadError),
}

/// What a completed boot found out.
#[derive(Debug)]
pub struct BootReport {
    pub dimensions: Option<Dimensions>,
    pub entries_listed: usize,
    pub symbols: SymbolTable,
    pub symbol_load: SymbolLoad,
}

/// Subsystems the sequencer drives but does not own.
pub struct BootHooks<'a> {
    pub memory: &'a mut dyn MemoryManager,
    pub target: &'a mut dyn Target,
    pub fs: &'a dyn FileSystem,
    pub loader: &'a mut dyn SymbolLoader,
}

/// Runs the boot stages once and remembers how far it got.
pub struct BootSequencer<'a> {
    config: BootConfig,
    registry: &'a TerminalRegistry,
    completed: [Option<BootStage>; STAGE_COUNT],
    done: usize,
}

impl<'a> BootSequencer<'a> {
    pub fn new(config: BootConfig, registry: &'a TerminalRegistry) -> Self {
        Self {
            config,
            registry,
            completed: [None; STAGE_COUNT],
            done: 0,
        }
    }

    /// Stages that have completed, in order.
    pub fn completed(&self) -> impl Iterator<Item = BootStage> + '_ {
        self.completed[..self.done].iter().flatten().copied()
    }

    /// Run the whole sequence.
    ///
    /// `terminal` selects and opens a backend and installs it into the
    /// registry it is given.
    pub fn run<F>(&mut self, terminal: F, hooks: &mut BootHooks<'_>) -> Result<BootReport, BootError>
    where
        F: FnOnce(&TerminalRegistry) -> Result<(), TermError>,
    {
        if self.config.mm_first {
            self.bring_up_memory(hooks.memory);
        }

        self.bring_up_terminal(terminal)?;

        if !self.config.mm_first {
            self.bring_up_memory(hooks.memory);
        }

        self.init_target(hooks.target)?;

        let dimensions = if self.config.probe_dimensions {
            self.probe_dimensions()
        } else {
            None
        };

        let entries_listed = self.walk_file_system(hooks.fs);
        let (symbols, symbol_load) = self.load_symbols(hooks.fs, hooks.loader);

        self.finish(BootStage::Idle);
        Ok(BootReport {
            dimensions,
            entries_listed,
            symbols,
            symbol_load,
        })
    }

    fn finish(&mut self, stage: BootStage) {
        if let Some(slot) = self.completed.get_mut(self.done) {
            *slot = Some(stage);
            self.done += 1;
        }
    }

    fn bring_up_memory(&mut self, memory: &mut dyn MemoryManager) {
        log::info!("initializing physical memory management");
        memory.init_physical();
        log::info!("initializing virtual memory management");
        memory.init_virtual();
        self.finish(BootStage::MemoryBringup);
    }

    fn bring_up_terminal<F>(&mut self, terminal: F) -> Result<(), BootError>
    where
        F: FnOnce(&TerminalRegistry) -> Result<(), TermError>,
    {
        if let Err(err) = terminal(self.registry) {
            log::error!("terminal bring-up failed: {}", err);
            return Err(BootError::Terminal(err));
        }
        self.finish(BootStage::TerminalBringup);

        log::info!("SysX kernel {} (sysx-kernel)", env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    fn init_target(&mut self, target: &mut dyn Target) -> Result<(), BootError> {
        log::info!("invoking target-specific system initialization routine");
        if let Err(err) = target.init() {
            log::error!("{}, halting boot", err);
            return Err(BootError::TargetInit(err));
        }
        self.finish(BootStage::TargetInit);
        Ok(())
    }

    fn probe_dimensions(&mut self) -> Option<Dimensions> {
        let mut budget;
        let mut forever = Forever;
        let deadline: &mut dyn Deadline = match self.config.probe_budget {
            Some(polls) => {
                budget = PollBudget::new(polls);
                &mut budget
            }
            None => &mut forever,
        };

        let probed = self
            .registry
            .get()
            .and_then(|console| console.dimensions_within(deadline));
        self.finish(BootStage::DimensionProbe);

        match probed {
            Ok(dims) => {
                log::info!("terminal size: {} x {}", dims.width, dims.height);
                Some(dims)
            }
            Err(err) => {
                log::warn!("terminal size unavailable: {}", err);
                None
            }
        }
    }

    fn walk_file_system(&mut self, fs: &dyn FileSystem) -> usize {
        let listed = match fs.root() {
            Some(root) => vfs::dir_list(fs, &root, 0),
            None => {
                log::warn!("no root file system mounted, skipping listing");
                0
            }
        };
        self.finish(BootStage::FileSystemWalk);
        listed
    }

    fn load_symbols(&mut self, fs: &dyn FileSystem, loader: &mut dyn SymbolLoader) -> (SymbolTable, SymbolLoad) {
        log::info!("creating kernel symbol table");
        let mut symbols = SymbolTable::with_capacity(self.config.symbol_capacity);

        log::info!("locating kernel symbols file at {}", self.config.symbol_path);
        let outcome = match fs.traverse_path(self.config.symbol_path) {
            None => {
                log::info!("cannot find kernel symbols file, skipping");
                SymbolLoad::NotFound
            }
            Some(node) => {
                log::info!("loading kernel symbols");
                match loader.load(&node, self.config.entry_symbol, &mut symbols) {
                    Ok(()) => {
                        log::info!("{} symbol(s) have been added to kernel symbol pool", symbols.len());
                        SymbolLoad::Loaded(symbols.len())
                    }
                    Err(err) => {
                        log::warn!("kernel symbols not loaded: {}", err);
                        SymbolLoad::Failed(err)
                    }
                }
            }
        };

        self.finish(BootStage::SymbolTableLoad);
        (symbols, outcome)
    }
}

/// Run the boot sequence with a fresh sequencer.
pub fn kinit<F>(
    config: BootConfig,
    registry: &TerminalRegistry,
    terminal: F,
    hooks: &mut BootHooks<'_>,
) -> Result<BootReport, BootError>
where
    F: FnOnce(&TerminalRegistry) -> Result<(), TermError>,
{
    BootSequencer::new(config, registry).run(terminal, hooks)
}
