/*  Append-only lease journal, spec.md §4.6. Every committed lease
 *  transition is written as one line before it takes effect in memory,
 *  so a restart can replay the file and reconstruct lease state exactly.
 *  Compaction rewrites the file holding only the most recent record per
 *  address, using a temporary file renamed into place (`rename(2)` is
 *  atomic on the same filesystem) so a crash mid-compaction can never
 *  leave a reader looking at a half-written file.
 */
use crate::lease::{Lease, LeaseState};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn state_tag(s: LeaseState) -> &'static str {
    match s {
        LeaseState::Free => "free",
        LeaseState::Offered => "offered",
        LeaseState::Active => "active",
        LeaseState::Expired => "expired",
        LeaseState::Released => "released",
        LeaseState::Abandoned => "abandoned",
        LeaseState::Reset => "reset",
        LeaseState::Bootp => "bootp",
    }
}

fn parse_state_tag(s: &str) -> Option<LeaseState> {
    Some(match s {
        "free" => LeaseState::Free,
        "offered" => LeaseState::Offered,
        "active" => LeaseState::Active,
        "expired" => LeaseState::Expired,
        "released" => LeaseState::Released,
        "abandoned" => LeaseState::Abandoned,
        "reset" => LeaseState::Reset,
        "bootp" => LeaseState::Bootp,
        _ => return None,
    })
}

fn to_epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn from_epoch_secs(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s == "-" {
        return Some(vec![]);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

/// One line: `address state serial starts ends hardware client-id hostname`.
/// Missing fields are written as `-`.
fn format_record(lease: &Lease) -> String {
    format!(
        "{} {} {} {} {} {} {} {}",
        lease.address,
        state_tag(lease.state),
        lease.serial,
        lease.starts.map(to_epoch_secs).map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        lease.ends.map(to_epoch_secs).map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        lease.hardware.as_ref().map(|h| hex(&h.addr)).unwrap_or_else(|| "-".into()),
        lease.client_id.as_deref().map(hex).unwrap_or_else(|| "-".into()),
        lease.hostname.as_deref().unwrap_or("-"),
    )
}

fn parse_record(line: &str) -> Option<Lease> {
    let mut fields = line.split_whitespace();
    let address: Ipv4Addr = fields.next()?.parse().ok()?;
    let state = parse_state_tag(fields.next()?)?;
    let serial: u64 = fields.next()?.parse().ok()?;
    let starts = match fields.next()? {
        "-" => None,
        s => Some(from_epoch_secs(s.parse().ok()?)),
    };
    let ends = match fields.next()? {
        "-" => None,
        s => Some(from_epoch_secs(s.parse().ok()?)),
    };
    let hardware = match fields.next()? {
        "-" => None,
        s => Some(dhcpd4_net::HwAddr::ethernet(unhex(s)?.try_into().ok()?)),
    };
    let client_id = match fields.next()? {
        "-" => None,
        s => Some(unhex(s)?),
    };
    let hostname = match fields.next()? {
        "-" => None,
        s => Some(s.to_string()),
    };
    Some(Lease { address, state, hardware, client_id, hostname, starts, ends, serial, bindings: HashMap::new() })
}

pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Journal { path, file })
    }

    /// Replays the journal, keeping only each address's highest-serial
    /// record, per spec.md §4.6's "seen-bit audit": a record superseded
    /// by a later one for the same address never reaches the live table.
    pub fn load(path: impl AsRef<Path>) -> io::Result<HashMap<Ipv4Addr, Lease>> {
        let path = path.as_ref();
        let mut leases: HashMap<Ipv4Addr, Lease> = HashMap::new();
        if !path.exists() {
            return Ok(leases);
        }
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(lease) = parse_record(&line) {
                match leases.get(&lease.address) {
                    Some(existing) if existing.serial >= lease.serial => {}
                    _ => {
                        leases.insert(lease.address, lease);
                    }
                }
            } else {
                log::warn!("lease journal: ignoring unparseable line {:?}", line);
            }
        }
        Ok(leases)
    }

    pub fn append(&mut self, lease: &Lease) -> io::Result<()> {
        writeln!(self.file, "{}", format_record(lease))?;
        self.file.flush()
    }

    /// Rewrites the journal holding one record per address (the current
    /// in-memory state), via a temp file renamed into place.
    pub fn compact(&mut self, leases: &HashMap<Ipv4Addr, Lease>) -> io::Result<()> {
        let tmp_path = self.path.with_extension("compact.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for lease in leases.values() {
                writeln!(tmp, "{}", format_record(lease))?;
            }
            tmp.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn round_trips_a_record() {
        let mut lease = Lease::free("10.0.0.5".parse().unwrap());
        lease.commit(
            dhcpd4_net::HwAddr::ethernet([1, 2, 3, 4, 5, 6]),
            Some(vec![0xAB]),
            Some("host1".into()),
            UNIX_EPOCH,
            Duration::from_secs(600),
        );
        let line = format_record(&lease);
        let parsed = parse_record(&line).unwrap();
        assert_eq!(parsed.address, lease.address);
        assert_eq!(parsed.state, lease.state);
        assert_eq!(parsed.client_id, lease.client_id);
        assert_eq!(parsed.hostname, lease.hostname);
    }

    #[test]
    fn load_keeps_only_the_highest_serial_per_address() {
        let dir = std::env::temp_dir().join(format!("dhcpd4-journal-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leases.txt");
        let mut journal = Journal::open(&path).unwrap();
        let mut lease = Lease::free("10.0.0.5".parse().unwrap());
        lease.commit(dhcpd4_net::HwAddr::ethernet([1; 6]), None, None, UNIX_EPOCH, Duration::from_secs(60));
        journal.append(&lease).unwrap();
        lease.release(UNIX_EPOCH + Duration::from_secs(30));
        journal.append(&lease).unwrap();
        let loaded = Journal::load(&path).unwrap();
        assert_eq!(loaded.get(&lease.address).unwrap().state, LeaseState::Released);
        std::fs::remove_dir_all(&dir).ok();
    }
}
