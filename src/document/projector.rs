//! Projection of canonical band records into one aggregate document per band.
//!
//! Nested lists are copied as they come: a genre listed twice for a band stays
//! listed twice, unlike the relational associations.

use crate::source::{Album, Band, Membership};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenreEntry {
    pub genre_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub member_url: String,
    pub member_name: String,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlbumEntry {
    /// Synthetic key used to address one embedded album.
    pub album_id: String,
    pub album_name: Option<String>,
    #[serde(with = "crate::temporal::document_instant")]
    pub release_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub running_time: Option<f64>,
    pub sales: Option<i64>,
}

impl AlbumEntry {
    pub fn from_album(album: &Album) -> Self {
        AlbumEntry {
            album_id: Uuid::new_v4().to_string(),
            album_name: album.name.clone(),
            release_date: album.release_date.map(|d| d.to_document_instant()),
            description: album.description.clone(),
            running_time: album.running_time,
            sales: album.sales,
        }
    }
}

impl From<&Membership> for MemberEntry {
    fn from(member: &Membership) -> Self {
        MemberEntry {
            member_url: member.member_url.clone(),
            member_name: member.member_name.clone(),
            active: member.active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandDocument {
    pub band_url: String,
    pub band_name: String,
    pub genres: Vec<GenreEntry>,
    pub members: Vec<MemberEntry>,
    pub albums: Vec<AlbumEntry>,
}

impl BandDocument {
    pub fn from_band(band: &Band) -> Self {
        BandDocument {
            band_url: band.url.clone(),
            band_name: band.name.clone(),
            genres: band
                .genres
                .iter()
                .map(|g| GenreEntry {
                    genre_name: g.clone(),
                })
                .collect(),
            members: band.members.iter().map(MemberEntry::from).collect(),
            albums: band.albums.iter().map(AlbumEntry::from_album).collect(),
        }
    }
}

pub fn project(bands: &[Band]) -> Vec<BandDocument> {
    bands.iter().map(BandDocument::from_band).collect()
}
