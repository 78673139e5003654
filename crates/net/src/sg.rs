//! Linux SCSI generic transport (`/dev/sgN`).

use crate::transport::{CommandDescriptor, DataPhase, SENSE_LEN, ScsiTransport};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::trace;

// SG_IO ioctl number from <scsi/sg.h>.
const SG_IO: libc::c_ulong = 0x2285;
const SG_INTERFACE_ID: libc::c_int = b'S' as libc::c_int;

const SG_DXFER_NONE: libc::c_int = -1;
const SG_DXFER_TO_DEV: libc::c_int = -2;
const SG_DXFER_FROM_DEV: libc::c_int = -3;

const DRIVER_SENSE: u16 = 0x08;

/// Milliseconds the kernel waits for one command. SG_IO requires a bound;
/// this is long enough that no adapter command reaches it in practice.
const COMMAND_TIMEOUT_MS: libc::c_uint = 60_000;

/// `struct sg_io_hdr` from <scsi/sg.h>.
#[repr(C)]
struct SgIoHdr {
    interface_id: libc::c_int,
    dxfer_direction: libc::c_int,
    cmd_len: libc::c_uchar,
    mx_sb_len: libc::c_uchar,
    iovec_count: libc::c_ushort,
    dxfer_len: libc::c_uint,
    dxferp: *mut libc::c_void,
    cmdp: *mut libc::c_uchar,
    sbp: *mut libc::c_uchar,
    timeout: libc::c_uint,
    flags: libc::c_uint,
    pack_id: libc::c_int,
    usr_ptr: *mut libc::c_void,
    status: libc::c_uchar,
    masked_status: libc::c_uchar,
    msg_status: libc::c_uchar,
    sb_len_wr: libc::c_uchar,
    host_status: libc::c_ushort,
    driver_status: libc::c_ushort,
    resid: libc::c_int,
    duration: libc::c_uint,
    info: libc::c_uint,
}

/// Transport over a Linux SCSI generic device node.
#[derive(Debug)]
pub struct SgTransport {
    file: File,
    path: PathBuf,
}

impl SgTransport {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        trace!(path = %path.display(), "opened scsi generic device");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScsiTransport for SgTransport {
    fn execute(&mut self, cmd: &mut CommandDescriptor, data: DataPhase<'_>) -> io::Result<()> {
        let mut cdb = *cmd.cdb();
        let mut sense = [0u8; SENSE_LEN];

        let (direction, dxferp, dxfer_len) = match data {
            DataPhase::None => (SG_DXFER_NONE, std::ptr::null_mut(), 0),
            DataPhase::In(buf) => (
                SG_DXFER_FROM_DEV,
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            ),
            // The kernel only reads from a to-device buffer.
            DataPhase::Out(buf) => (
                SG_DXFER_TO_DEV,
                buf.as_ptr().cast_mut().cast::<libc::c_void>(),
                buf.len(),
            ),
        };
        let dxfer_len = libc::c_uint::try_from(dxfer_len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "transfer too large"))?;

        let mut hdr = SgIoHdr {
            interface_id: SG_INTERFACE_ID,
            dxfer_direction: direction,
            cmd_len: cdb.len() as libc::c_uchar,
            mx_sb_len: SENSE_LEN as libc::c_uchar,
            iovec_count: 0,
            dxfer_len,
            dxferp,
            cmdp: cdb.as_mut_ptr(),
            sbp: sense.as_mut_ptr(),
            timeout: COMMAND_TIMEOUT_MS,
            flags: 0,
            pack_id: 0,
            usr_ptr: std::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };

        // SAFETY: every pointer in `hdr` refers to a live buffer of the
        // advertised length for the duration of the call.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), SG_IO as _, &mut hdr) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let driver_failed = hdr.driver_status & !DRIVER_SENSE != 0;
        cmd.status = if hdr.status != 0 {
            hdr.status
        } else if hdr.host_status != 0 || driver_failed {
            0xff
        } else {
            0
        };
        let resid = usize::try_from(hdr.resid).unwrap_or(0);
        cmd.actual = (dxfer_len as usize).saturating_sub(resid);
        cmd.sense_len = usize::from(hdr.sb_len_wr).min(SENSE_LEN);
        cmd.sense = sense;

        trace!(
            opcode = cmd.opcode(),
            status = cmd.status,
            actual = cmd.actual,
            duration_ms = hdr.duration,
            "sg command"
        );
        Ok(())
    }
}
