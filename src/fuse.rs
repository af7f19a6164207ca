//! Read-only FUSE adapter over [`VirtualFs`].
//!
//! Inode numbers are assigned per path and kept across tree generations, so
//! a kernel that cached an inode before a rescan still resolves it to the
//! same path afterwards. Free-space figures come from the filesystem that
//! holds the library.

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyXattr, Request, FUSE_ROOT_ID,
};
use rustix::fs::{statvfs, StatVfs};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::vfs::{FileKind, Stat, VirtualFs};

const TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u32 = 4096;

/// Bidirectional path <-> inode mapping. Inodes are never reused.
#[derive(Debug)]
pub struct InodeTable {
    by_path: HashMap<String, u64>,
    by_ino: HashMap<u64, String>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        let mut table = Self {
            by_path: HashMap::new(),
            by_ino: HashMap::new(),
            next: FUSE_ROOT_ID + 1,
        };
        table.by_path.insert("/".to_string(), FUSE_ROOT_ID);
        table.by_ino.insert(FUSE_ROOT_ID, "/".to_string());
        table
    }
}

impl InodeTable {
    pub fn ino(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_path.insert(path.to_string(), ino);
        self.by_ino.insert(ino, path.to_string());
        ino
    }

    pub fn path(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn system_time(secs: i64) -> SystemTime {
    u64::try_from(secs)
        .map(|s| UNIX_EPOCH + Duration::from_secs(s))
        .unwrap_or(UNIX_EPOCH)
}

fn errno(e: &io::Error) -> i32 {
    match e.kind() {
        io::ErrorKind::NotFound => libc::ENOENT,
        io::ErrorKind::PermissionDenied => libc::EACCES,
        io::ErrorKind::InvalidInput => libc::EISDIR,
        _ => e.raw_os_error().unwrap_or(libc::EIO),
    }
}

pub struct ShotwellFs {
    vfs: Arc<VirtualFs>,
    inodes: InodeTable,
    library: PathBuf,
    uid: u32,
    gid: u32,
}

impl ShotwellFs {
    pub fn new(vfs: Arc<VirtualFs>, library: PathBuf) -> Self {
        Self {
            vfs,
            inodes: InodeTable::default(),
            library,
            uid: rustix::process::getuid().as_raw(),
            gid: rustix::process::getgid().as_raw(),
        }
    }

    /// Statistics of the filesystem holding `ino`'s backing file, or the
    /// library's when it has none.
    fn disk_stats(&self, ino: u64) -> io::Result<StatVfs> {
        let backing = self.inodes.path(ino).and_then(|path| self.vfs.backing_path(path));
        let target = backing.as_deref().unwrap_or(self.library.as_path());
        statvfs(target).map_err(io::Error::from)
    }

    fn file_attr(&self, ino: u64, stat: &Stat) -> FileAttr {
        let (kind, perm, nlink) = match stat.kind {
            FileKind::Directory => (FileType::Directory, 0o555, 2),
            FileKind::File => (FileType::RegularFile, 0o444, 1),
        };
        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: system_time(stat.times.atime),
            mtime: system_time(stat.times.mtime),
            ctime: system_time(stat.times.ctime),
            crtime: system_time(stat.times.ctime),
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn reply_xattr(bytes: &[u8], size: u32, reply: ReplyXattr) {
        if size == 0 {
            reply.size(bytes.len() as u32);
        } else if bytes.len() > size as usize {
            reply.error(libc::ERANGE);
        } else {
            reply.data(bytes);
        }
    }
}

impl Filesystem for ShotwellFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.inodes.path(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = join(parent_path, &name.to_string_lossy());
        match self.vfs.attributes(&path) {
            Some(stat) => {
                let ino = self.inodes.ino(&path);
                reply.entry(&TTL, &self.file_attr(ino, &stat), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.inodes.path(ino).and_then(|path| self.vfs.attributes(path)) {
            Some(stat) => reply.attr(&TTL, &self.file_attr(ino, &stat)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EROFS);
            return;
        }
        match self.inodes.path(ino).and_then(|path| self.vfs.lookup(path)) {
            Some(node) if !node.is_dir() => reply.opened(0, 0),
            Some(_) => reply.error(libc::EISDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.vfs.read(path, offset, size as usize) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => {
                tracing::warn!(path, error = %e, "Read failed");
                reply.error(errno(&e));
            }
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.inodes.path(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(dir) = self.vfs.lookup(&path) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(names) = dir.child_names() else {
            reply.error(libc::ENOTDIR);
            return;
        };

        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for name in names {
            let kind = match dir.child(&name) {
                Some(child) if child.is_dir() => FileType::Directory,
                _ => FileType::RegularFile,
            };
            let child_ino = self.inodes.ino(&join(&path, &name));
            entries.push((child_ino, kind, name));
        }

        for (index, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(entry_ino, (index + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.vfs.xattr(path, &name.to_string_lossy()) {
            Some(value) => Self::reply_xattr(value.as_bytes(), size, reply),
            None => reply.error(libc::ENODATA),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        match self.disk_stats(ino) {
            Ok(stat) => reply.statfs(
                stat.f_blocks,
                stat.f_bfree,
                stat.f_bavail,
                stat.f_files,
                stat.f_ffree,
                stat.f_bsize as u32,
                stat.f_namemax as u32,
                stat.f_frsize as u32,
            ),
            Err(e) => {
                tracing::warn!(ino, error = %e, "statfs failed");
                reply.error(errno(&e));
            }
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let Some(names) = self.inodes.path(ino).and_then(|path| self.vfs.xattr_names(path)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut bytes = Vec::new();
        for name in names {
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(0);
        }
        Self::reply_xattr(&bytes, size, reply);
    }
}

/// Mount read-only at `mountpoint` and block until unmounted. `library`
/// answers `statfs` for paths without a backing file.
pub fn mount(vfs: Arc<VirtualFs>, library: PathBuf, mountpoint: &Path) -> io::Result<()> {
    let options = [
        MountOption::RO,
        MountOption::FSName("shotwellfs".to_string()),
        MountOption::Subtype("shotwellfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    tracing::info!(mountpoint = %mountpoint.display(), "Mounting");
    fuser::mount2(ShotwellFs::new(vfs, library), mountpoint, &options)
}
