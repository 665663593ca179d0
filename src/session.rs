//! State kept between CLI invocations for one login.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::elab::{EntityType, Notebook, Team};
use crate::{Error, Result};

/// How many recent comments are remembered.
pub const HISTORY_LEN: usize = 10;

/// The entry commands operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub entity: EntityType,
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Key store user; `None` when the API key came from the environment.
    pub short_name: Option<String>,
    pub user_id: i64,
    pub fullname: String,
    pub team: Team,

    /// Entity type used by `list` and `create` when none is given.
    pub entity: EntityType,
    pub selection: Option<Selection>,
    pub sample_id: Option<i64>,

    pub comment_history: Vec<String>,

    /// Pid of a recognizer started by `transcribe start`.
    pub recognizer_pid: Option<u32>,
}

impl Session {
    /// Read the session file; `None` if nobody is logged in.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Like [`Session::load`], but a missing session is an error.
    pub fn require(path: &Path) -> Result<Self> {
        Self::load(path)?.ok_or(Error::NotLoggedIn)
    }

    /// Write the session file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %path.display(), "session saved");
        Ok(())
    }

    /// Remove the session file. Clearing twice is fine.
    pub fn clear(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    pub fn select(&mut self, entity: EntityType, id: i64, title: impl Into<String>) {
        self.entity = entity;
        self.selection = Some(Selection {
            entity,
            id,
            title: title.into(),
        });
    }

    pub fn selected(&self) -> Result<&Selection> {
        self.selection.as_ref().ok_or(Error::NoSelection("entry"))
    }

    /// The selected entry, which must be an experiment.
    pub fn selected_experiment(&self) -> Result<&Selection> {
        match self.selected()? {
            s if s.entity == EntityType::Experiments => Ok(s),
            _ => Err(Error::NoSelection("experiment")),
        }
    }

    pub fn selected_sample(&self) -> Result<i64> {
        self.sample_id.ok_or(Error::NoSelection("sample"))
    }

    /// Remember what was written where, keeping the last [`HISTORY_LEN`] messages.
    pub fn record_comment(&mut self, prompt: &str) {
        let (noun, title) = match &self.selection {
            Some(s) => (s.entity.noun(), s.title.as_str()),
            None => (self.entity.noun(), ""),
        };
        let short: String = prompt.chars().take(80).collect();
        self.comment_history
            .push(format!("Wrote in {noun} {title}: {short}"));
        if self.comment_history.len() > HISTORY_LEN {
            let excess = self.comment_history.len() - HISTORY_LEN;
            self.comment_history.drain(..excess);
        }
    }
}

/// Pick the team to work in.
///
/// No team yields an empty placeholder and a single team is taken as is. With several teams
/// `choice` (a name or an id) must pick one.
pub fn choose_team(teams: &[Team], choice: Option<&str>) -> Result<Team> {
    match teams {
        [] => Ok(Team {
            id: 0,
            name: String::new(),
        }),
        [only] => Ok(only.clone()),
        _ => {
            let names = || {
                teams
                    .iter()
                    .map(|t| format!("{} ({})", t.name, t.id))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let choice = choice.map(str::trim).ok_or_else(|| {
                Error::msg(format!(
                    "you are a member of {} teams, choose one of: {}",
                    teams.len(),
                    names()
                ))
            })?;
            teams
                .iter()
                .find(|t| t.name == choice || t.id.to_string() == choice)
                .cloned()
                .ok_or_else(|| Error::msg(format!("no team '{choice}'; choose one of: {}", names())))
        }
    }
}

/// Resolve the key's owner and team into a fresh session.
pub fn login(
    notebook: &dyn Notebook,
    short_name: Option<&str>,
    team_choice: Option<&str>,
) -> Result<Session> {
    let me = notebook.me()?;
    let team = choose_team(&me.teams, team_choice)?;
    let fullname = if me.fullname.is_empty() {
        format!("{} {}", me.firstname, me.lastname).trim().to_string()
    } else {
        me.fullname
    };
    info!(user = %fullname, team = %team.name, "logged in");
    Ok(Session {
        short_name: short_name.map(str::to_string),
        user_id: me.userid,
        fullname,
        team,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(id: i64, name: &str) -> Team {
        Team {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn team_choice() -> anyhow::Result<()> {
        assert_eq!(choose_team(&[], None)?, team(0, ""));
        assert_eq!(choose_team(&[team(3, "Surface")], None)?, team(3, "Surface"));

        let many = [team(3, "Surface"), team(5, "Catalysis")];
        assert!(choose_team(&many, None).is_err());
        assert!(choose_team(&many, Some("Optics")).is_err());
        assert_eq!(choose_team(&many, Some("Catalysis"))?.id, 5);
        assert_eq!(choose_team(&many, Some("3"))?.name, "Surface");
        Ok(())
    }

    #[test]
    fn history_keeps_last_ten() {
        let mut s = Session::default();
        s.select(EntityType::Experiments, 7, "Anneal series");
        for i in 0..12 {
            s.record_comment(&format!("note {i}"));
        }
        assert_eq!(s.comment_history.len(), HISTORY_LEN);
        assert_eq!(s.comment_history[0], "Wrote in experiment Anneal series: note 2");

        s.record_comment(&"x".repeat(200));
        assert!(s.comment_history[9].ends_with(&"x".repeat(80)));
        assert!(!s.comment_history[9].ends_with(&"x".repeat(81)));
    }

    #[test]
    fn save_load_clear() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state").join("session.json");
        assert_eq!(Session::load(&path)?, None);
        assert!(matches!(Session::require(&path), Err(Error::NotLoggedIn)));

        let mut s = Session {
            short_name: Some("alice".into()),
            fullname: "Alice M.".into(),
            ..Default::default()
        };
        s.select(EntityType::Items, 12, "Pt(111) crystal");
        s.save(&path)?;
        assert_eq!(Session::load(&path)?, Some(s));

        Session::clear(&path)?;
        Session::clear(&path)?;
        assert_eq!(Session::load(&path)?, None);
        Ok(())
    }

    #[test]
    fn selection_kinds() {
        let mut s = Session::default();
        assert!(matches!(s.selected(), Err(Error::NoSelection("entry"))));
        s.select(EntityType::Items, 1, "foil");
        assert!(matches!(
            s.selected_experiment(),
            Err(Error::NoSelection("experiment"))
        ));
        assert!(s.selected_sample().is_err());
    }
}
