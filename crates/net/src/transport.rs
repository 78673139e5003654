use std::io;

/// Length of every command block the adapter understands.
pub const CDB_LEN: usize = 6;
/// Sense bytes kept per command.
pub const SENSE_LEN: usize = 20;

/// One SCSI command and its outcome.
///
/// Built fresh for every transport operation so status and length fields
/// from a previous command can never leak into the next one.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    cdb: [u8; CDB_LEN],
    /// SCSI status byte. Starts non-zero so an unexecuted command reads as failed.
    pub status: u8,
    /// Bytes actually moved in the data phase.
    pub actual: usize,
    pub sense: [u8; SENSE_LEN],
    pub sense_len: usize,
}

impl CommandDescriptor {
    pub fn new(cdb: [u8; CDB_LEN]) -> Self {
        Self {
            cdb,
            status: 1,
            actual: 0,
            sense: [0; SENSE_LEN],
            sense_len: 0,
        }
    }

    pub fn cdb(&self) -> &[u8; CDB_LEN] {
        &self.cdb
    }

    pub fn opcode(&self) -> u8 {
        self.cdb[0]
    }

    /// Sense bytes the target actually returned.
    pub fn sense_data(&self) -> &[u8] {
        &self.sense[..self.sense_len.min(SENSE_LEN)]
    }

    pub fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// Direction and buffer of a command's data phase.
#[derive(Debug)]
pub enum DataPhase<'a> {
    None,
    /// Target to host.
    In(&'a mut [u8]),
    /// Host to target.
    Out(&'a [u8]),
}

impl DataPhase<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataPhase::None => 0,
            DataPhase::In(buf) => buf.len(),
            DataPhase::Out(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Abstraction for the block/command channel to the adapter.
///
/// Commands are executed synchronously and one at a time; the bridge worker
/// is the only caller once a session is running. Implementations record the
/// SCSI status, transfer length and sense data into `cmd` and only return
/// `Err` when the command could not be issued at all.
pub trait ScsiTransport: Send + 'static {
    fn execute(&mut self, cmd: &mut CommandDescriptor, data: DataPhase<'_>) -> io::Result<()>;
}

impl<T: ScsiTransport + ?Sized> ScsiTransport for Box<T> {
    fn execute(&mut self, cmd: &mut CommandDescriptor, data: DataPhase<'_>) -> io::Result<()> {
        (**self).execute(cmd, data)
    }
}
