use std::{
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info};
use time::{macros::format_description, OffsetDateTime};

use crate::{gql::GqlClient, helix::HelixClient, Error};

/// Report lines, one per followed channel in the order they were fetched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub lines: Vec<String>,
}

impl Report {
    /// `<username>_ChannelPoints_<yyyyMMdd_HHmmss>.csv`
    pub fn file_name(username: &str, timestamp: OffsetDateTime) -> String {
        let stamp = timestamp
            .format(format_description!("[year][month][day]_[hour][minute][second]"))
            .unwrap_or_else(|_| timestamp.unix_timestamp().to_string());
        format!("{}_ChannelPoints_{}.csv", username, stamp)
    }

    /// Write the report into `dir`, creating it if needed, and return the file path.
    pub fn write_to(
        &self,
        dir: &Path,
        username: &str,
        timestamp: OffsetDateTime,
    ) -> Result<PathBuf, Error> {
        let path = dir.join(Report::file_name(username, timestamp));
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
            for line in &self.lines {
                writeln!(file, "{}", line)?;
            }
            file.flush()
        };
        write().map_err(|source| Error::WriteReport {
            path: path.clone(),
            source,
        })?;
        info!("wrote {} lines to {}", self.lines.len(), path.display());
        Ok(path)
    }
}

/// Current local time, or UTC when the local offset can not be determined.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Where reports go when no directory is given.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Builds a [`Report`] for one user from authenticated clients.
pub struct ReportAssembler<'a> {
    helix: &'a HelixClient,
    gql: &'a GqlClient,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(helix: &'a HelixClient, gql: &'a GqlClient) -> Self {
        ReportAssembler { helix, gql }
    }

    /// Resolve `username`, walk its follows and look up points for each channel in turn.
    ///
    /// Only the user lookup can fail; follow pagination and channel lookups degrade into
    /// shorter or annotated reports.
    pub async fn assemble(&self, username: &str) -> Result<Report, Error> {
        let user_id = self.helix.user_id(username).await?;
        debug!("state: user resolved");

        let channels = self.helix.all_follows(&user_id).await;
        debug!("state: follows fetched");
        info!("fetching channel points for {} followed streams", channels.len());

        let mut lines = Vec::with_capacity(channels.len());
        for channel in &channels {
            let result = self.gql.channel_points(&channel.to_login).await;
            lines.push(result.to_string());
        }
        Ok(Report { lines })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn file_name_embeds_user_and_timestamp() {
        assert_eq!(
            Report::file_name("alice", datetime!(2023-09-05 07:08:09 UTC)),
            "alice_ChannelPoints_20230905_070809.csv"
        );
    }

    #[test]
    fn write_to_puts_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report {
            lines: vec!["Foo,1234".to_string(), "bar,Error fetching data: Bad Gateway".to_string()],
        };
        let path = report
            .write_to(&dir.path().join("out"), "alice", datetime!(2023-09-05 07:08:09 UTC))
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "alice_ChannelPoints_20230905_070809.csv");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Foo,1234\nbar,Error fetching data: Bad Gateway\n"
        );
    }

    #[test]
    fn empty_report_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Report::default()
            .write_to(dir.path(), "alice", datetime!(2023-09-05 07:08:09 UTC))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
