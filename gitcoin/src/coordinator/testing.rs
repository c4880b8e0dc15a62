//! In-memory repository double for coordinator tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use super::repo::{PushOutcome, RepoError, Repository};
use super::state::StateSettings;
use crate::protocol::CommitCandidate;
use crate::types::{CanonicalState, ObjectId};

struct Inner {
    /// Head of the branch on the simulated remote
    upstream: ObjectId,
    /// Last fetched upstream head (the remote-tracking ref)
    tracking: ObjectId,
    head: ObjectId,
    commits: HashMap<ObjectId, Vec<u8>>,
    fail_fetch: bool,
    generation: u32,
}

/// A working copy whose object store and remote live in memory.
///
/// Only the ledger and difficulty files are real, in a temporary directory.
/// Trees are the hash of the ledger contents; a push is accepted iff the
/// local head's parent is the simulated upstream head.
pub struct FakeRepository {
    dir: TempDir,
    inner: Mutex<Inner>,
}

fn parent_of(body: &[u8]) -> Option<ObjectId> {
    let text = std::str::from_utf8(body).ok()?;
    text.lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix("parent "))
        .and_then(|hex| hex.parse().ok())
}

/// Build a commit on `state` whose id meets the target.
pub fn mined(state: &CanonicalState, tag: &str) -> CommitCandidate {
    (0u32..)
        .map(|attempt| {
            format!(
                "tree {}\nparent {}\nauthor T <t@x> 1 +0000\ncommitter T <t@x> 1 +0000\n\n{} {}",
                state.tree, state.parent, tag, attempt
            )
            .into_bytes()
        })
        .map(|body| CommitCandidate {
            parent: state.parent,
            commit_id: ObjectId::for_object("commit", &body),
            body,
        })
        .find(|candidate| state.difficulty.is_met_by(&candidate.commit_id))
        .unwrap()
}

impl FakeRepository {
    pub fn new(difficulty: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("difficulty.txt"), format!("{}\n", difficulty)).unwrap();

        let root_body = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\nroot".to_vec();
        let root = ObjectId::for_object("commit", &root_body);
        let mut commits = HashMap::new();
        commits.insert(root, root_body);

        Self {
            dir,
            inner: Mutex::new(Inner {
                upstream: root,
                tracking: root,
                head: root,
                commits,
                fail_fetch: false,
                generation: 0,
            }),
        }
    }

    pub fn settings(&self, username: &str) -> StateSettings {
        StateSettings {
            username: username.to_string(),
            ledger_file: "LEDGER.txt".into(),
            difficulty_file: "difficulty.txt".into(),
        }
    }

    pub fn upstream(&self) -> ObjectId {
        self.inner.lock().unwrap().upstream
    }

    pub fn local_head(&self) -> ObjectId {
        self.inner.lock().unwrap().head
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.inner.lock().unwrap().fail_fetch = fail;
    }

    pub fn ledger(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("LEDGER.txt")).unwrap_or_default()
    }

    /// Tree id the fake produces for the current ledger.
    pub fn expected_tree(&self) -> ObjectId {
        ObjectId::for_object("tree", self.ledger().as_bytes())
    }

    /// Simulate another coordinator winning: upstream moves to a new child.
    pub fn advance_upstream(&self) -> ObjectId {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        let body = format!(
            "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nparent {}\n\nelsewhere {}",
            inner.upstream, inner.generation
        )
        .into_bytes();
        let id = ObjectId::for_object("commit", &body);
        inner.commits.insert(id, body);
        inner.upstream = id;
        id
    }
}

#[async_trait]
impl Repository for FakeRepository {
    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    async fn fetch(&self) -> Result<ObjectId, RepoError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_fetch {
            return Err(RepoError::Io(std::io::Error::other("remote unreachable")));
        }
        inner.tracking = inner.upstream;
        Ok(inner.tracking)
    }

    async fn reset_to_upstream(&self) -> Result<(), RepoError> {
        let mut inner = self.inner.lock().unwrap();
        inner.head = inner.tracking;
        Ok(())
    }

    async fn reset_hard(&self, commit: &ObjectId) -> Result<(), RepoError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.commits.contains_key(commit) {
            return Err(RepoError::InvalidOutput {
                args: format!("reset --hard {}", commit),
                output: "unknown revision".into(),
            });
        }
        inner.head = *commit;
        Ok(())
    }

    async fn head(&self) -> Result<ObjectId, RepoError> {
        Ok(self.inner.lock().unwrap().head)
    }

    async fn write_tree(&self) -> Result<ObjectId, RepoError> {
        Ok(self.expected_tree())
    }

    async fn write_commit(&self, body: &[u8]) -> Result<ObjectId, RepoError> {
        let id = ObjectId::for_object("commit", body);
        self.inner.lock().unwrap().commits.insert(id, body.to_vec());
        Ok(id)
    }

    async fn push(&self) -> Result<PushOutcome, RepoError> {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.head;
        let parent = inner.commits.get(&head).and_then(|body| parent_of(body));
        if parent == Some(inner.upstream) {
            inner.upstream = head;
            inner.tracking = head;
            Ok(PushOutcome::Accepted)
        } else {
            Ok(PushOutcome::Rejected)
        }
    }

    async fn stage(&self, _path: &Path) -> Result<(), RepoError> {
        Ok(())
    }
}
