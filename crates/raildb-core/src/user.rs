//! User accounts and the session table.

use raildb_common::{djb2, FixedCodec, FixedStr, Result};
use raildb_storage::{HashedMap, MetaFile, MetaSlot};
use std::collections::HashSet;
use std::path::Path;

/// One account record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub username: FixedStr<20>,
    pub password_hash: u64,
    pub name: FixedStr<16>,
    pub mail_addr: FixedStr<30>,
    pub privilege: i32,
}

impl UserRecord {
    /// `query_profile` / `modify_profile` output line.
    pub fn profile_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.username, self.name, self.mail_addr, self.privilege
        )
    }
}

impl FixedCodec for UserRecord {
    const ENCODED_LEN: usize = 78;

    fn encode_into(&self, buf: &mut [u8]) {
        self.username.encode_into(&mut buf[0..20]);
        self.password_hash.encode_into(&mut buf[20..28]);
        self.name.encode_into(&mut buf[28..44]);
        self.mail_addr.encode_into(&mut buf[44..74]);
        self.privilege.encode_into(&mut buf[74..78]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            username: FixedStr::decode_from(&buf[0..20]),
            password_hash: u64::decode_from(&buf[20..28]),
            name: FixedStr::decode_from(&buf[28..44]),
            mail_addr: FixedStr::decode_from(&buf[44..74]),
            privilege: i32::decode_from(&buf[74..78]),
        }
    }
}

/// Requested profile changes; absent fields stay as they are.
#[derive(Debug, Default)]
pub struct ProfileUpdate<'a> {
    pub password: Option<&'a str>,
    pub name: Option<&'a str>,
    pub mail_addr: Option<&'a str>,
    pub privilege: Option<i32>,
}

/// Account store plus the in-memory set of logged-in users.
///
/// Sessions are process-local: they are dropped on exit and do not
/// survive restart.
pub struct UserStore {
    users: HashedMap<UserRecord>,
    sessions: HashSet<u64>,
    first_user: MetaSlot<u8>,
}

impl UserStore {
    /// Opens the account tree inside `dir`.
    pub fn open(dir: &Path, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        Ok(Self {
            users: HashedMap::open(dir.join("users.dat"), fsync_enabled, meta)?,
            sessions: HashSet::new(),
            first_user: meta.slot(1u8)?,
        })
    }

    /// Creates an account. The very first account is granted privilege
    /// 10 with `cur_username` ignored; afterwards the acting user must
    /// be logged in and hold strictly higher privilege than the grant.
    pub fn add_user(
        &mut self,
        cur_username: &str,
        username: &str,
        password: &str,
        name: &str,
        mail_addr: &str,
        privilege: i32,
    ) -> Result<bool> {
        let mut privilege = privilege;
        if self.first_user.get() != 0 {
            privilege = 10;
        } else {
            let Some(cur) = self.users.find(cur_username)? else {
                return Ok(false);
            };
            if cur.privilege <= privilege || !self.is_logged_in(cur_username) {
                return Ok(false);
            }
            if self.users.find(username)?.is_some() {
                return Ok(false);
            }
        }

        let record = UserRecord {
            username: FixedStr::new(username),
            password_hash: djb2(password.as_bytes()),
            name: FixedStr::new(name),
            mail_addr: FixedStr::new(mail_addr),
            privilege,
        };
        self.users.insert(username, record)?;
        self.first_user.set(0)?;
        Ok(true)
    }

    /// Opens a session. Fails on unknown user, wrong password, or an
    /// already-open session.
    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        let Some(record) = self.users.find(username)? else {
            return Ok(false);
        };
        if record.password_hash != djb2(password.as_bytes()) {
            return Ok(false);
        }
        Ok(self.sessions.insert(djb2(username.as_bytes())))
    }

    /// Closes a session.
    pub fn logout(&mut self, username: &str) -> bool {
        self.sessions.remove(&djb2(username.as_bytes()))
    }

    /// Whether the user currently holds a session.
    pub fn is_logged_in(&self, username: &str) -> bool {
        self.sessions.contains(&djb2(username.as_bytes()))
    }

    /// Reads a profile. The acting user must be logged in and either be
    /// the target or outrank them.
    pub fn query_profile(&self, cur_username: &str, username: &str) -> Result<Option<String>> {
        if !self.is_logged_in(cur_username) {
            return Ok(None);
        }
        let (Some(cur), Some(target)) =
            (self.users.find(cur_username)?, self.users.find(username)?)
        else {
            return Ok(None);
        };
        if cur.privilege <= target.privilege && cur_username != username {
            return Ok(None);
        }
        Ok(Some(target.profile_line()))
    }

    /// Applies a profile update under the same visibility rule as
    /// `query_profile`; a privilege grant must stay strictly below the
    /// acting user's own.
    pub fn modify_profile(
        &mut self,
        cur_username: &str,
        username: &str,
        update: &ProfileUpdate<'_>,
    ) -> Result<Option<String>> {
        if !self.is_logged_in(cur_username) {
            return Ok(None);
        }
        let (Some(cur), Some(mut target)) =
            (self.users.find(cur_username)?, self.users.find(username)?)
        else {
            return Ok(None);
        };
        if cur.privilege <= target.privilege && cur_username != username {
            return Ok(None);
        }
        if let Some(privilege) = update.privilege {
            if privilege >= cur.privilege {
                return Ok(None);
            }
            target.privilege = privilege;
        }
        if let Some(password) = update.password {
            target.password_hash = djb2(password.as_bytes());
        }
        if let Some(name) = update.name {
            target.name = FixedStr::new(name);
        }
        if let Some(mail_addr) = update.mail_addr {
            target.mail_addr = FixedStr::new(mail_addr);
        }

        let line = target.profile_line();
        self.users.modify(username, |record| *record = target)?;
        Ok(Some(line))
    }

    /// Drops every session (clean exit).
    pub fn close_sessions(&mut self) {
        self.sessions.clear();
    }

    /// Drops every account, session, and the first-user marker.
    pub fn clear(&mut self) -> Result<()> {
        self.users.clear()?;
        self.sessions.clear();
        self.first_user.set(1)
    }

    /// Flushes the account tree.
    pub fn flush(&self) -> Result<()> {
        self.users.flush()
    }
}
