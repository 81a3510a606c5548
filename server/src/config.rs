// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::registry::DIAVGEIA_BASE_URL;

/// Runtime configuration, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub diavgeia_base_url: String,

    /// Local mount point of the office network share.
    pub share_mount: PathBuf,
    /// Folder under the share that holds per-case folders.
    pub share_base_dir: String,
    /// Folder under the share where completed cases are archived.
    pub share_completed_dir: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let host: IpAddr = std::env::var("HOST")
            .unwrap_or_else(|_| "127.0.0.1".into())
            .parse()
            .context("HOST is not a valid IP address")?;
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4000".into())
            .parse()
            .context("PORT is not a valid port number")?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data.db".into());

        let diavgeia_base_url =
            std::env::var("DIAVGEIA_BASE_URL").unwrap_or_else(|_| DIAVGEIA_BASE_URL.into());

        let share_mount =
            PathBuf::from(std::env::var("SHARE_MOUNT").unwrap_or_else(|_| "share".into()));
        let share_base_dir =
            std::env::var("SHARE_BASE_DIR").unwrap_or_else(|_| "cases".into());
        let share_completed_dir =
            std::env::var("SHARE_COMPLETED_DIR").unwrap_or_else(|_| "completed".into());

        Ok(Self {
            bind_addr: SocketAddr::from((host, port)),
            database_url,
            diavgeia_base_url,
            share_mount,
            share_base_dir,
            share_completed_dir,
        })
    }
}
