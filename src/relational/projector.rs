//! Projection of canonical band records into normalized tuples.
//!
//! Projection runs in two phases. Entity tuples need no surrogate ids and are
//! inserted first; association tuples (albums included, since they reference
//! their band) are built afterwards from the identity maps of that insert.

use crate::identity::{IdentityError, IdentityMaps};
use crate::source::Band;
use crate::temporal::CalendarDate;
use std::collections::HashSet;
use std::hash::Hash;

/// Appends `value` unless it was already seen, keeping first-occurrence order.
fn push_unique<T: Clone + Eq + Hash>(seen: &mut HashSet<T>, out: &mut Vec<T>, value: T) {
    if seen.insert(value.clone()) {
        out.push(value);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BandTuple {
    pub url: String,
    pub name: String,
}

/// Phase one: rows of the entity tables, deduplicated by natural key.
#[derive(Clone, Debug, Default)]
pub struct EntityTuples {
    pub bands: Vec<BandTuple>,
    pub genres: Vec<String>,
    pub musicians: Vec<String>,
}

impl EntityTuples {
    pub fn project(bands: &[Band]) -> Self {
        let mut tuples = EntityTuples::default();
        let mut seen_bands = HashSet::new();
        let mut seen_genres = HashSet::new();
        let mut seen_musicians = HashSet::new();

        for band in bands {
            if seen_bands.insert(band.url.as_str()) {
                tuples.bands.push(BandTuple {
                    url: band.url.clone(),
                    name: band.name.clone(),
                });
            }
            for genre in &band.genres {
                push_unique(&mut seen_genres, &mut tuples.genres, genre.clone());
            }
            for member in &band.members {
                push_unique(
                    &mut seen_musicians,
                    &mut tuples.musicians,
                    member.member_url.clone(),
                );
            }
        }
        tuples
    }

    pub fn band_urls(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.url.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlbumTuple {
    pub band_id: i64,
    pub name: Option<String>,
    pub release_date: Option<CalendarDate>,
    pub description: Option<String>,
    pub running_time: Option<f64>,
    pub sales: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HasGenreTuple {
    pub band_id: i64,
    pub genre_id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberOfTuple {
    pub musician_id: i64,
    pub band_id: i64,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HasNameTuple {
    pub musician_id: i64,
    pub name: String,
}

/// Phase two: rows that reference surrogate ids.
#[derive(Clone, Debug, Default)]
pub struct AssociationTuples {
    pub albums: Vec<AlbumTuple>,
    pub has_genre: Vec<HasGenreTuple>,
    pub member_of: Vec<MemberOfTuple>,
    pub has_name: Vec<HasNameTuple>,
}

impl AssociationTuples {
    pub fn project(bands: &[Band], maps: &IdentityMaps) -> Result<Self, IdentityError> {
        let mut tuples = AssociationTuples::default();
        let mut seen_has_genre = HashSet::new();
        let mut seen_member_of = HashSet::new();
        let mut seen_has_name = HashSet::new();

        for band in bands {
            let band_id = maps.bands.resolve(&band.url)?;

            for album in &band.albums {
                tuples.albums.push(AlbumTuple {
                    band_id,
                    name: album.name.clone(),
                    release_date: album.release_date,
                    description: album.description.clone(),
                    running_time: album.running_time,
                    sales: album.sales,
                });
            }

            for genre in &band.genres {
                let genre_id = maps.genres.resolve(genre)?;
                push_unique(
                    &mut seen_has_genre,
                    &mut tuples.has_genre,
                    HasGenreTuple { band_id, genre_id },
                );
            }

            for member in &band.members {
                let musician_id = maps.musicians.resolve(&member.member_url)?;
                push_unique(
                    &mut seen_member_of,
                    &mut tuples.member_of,
                    MemberOfTuple {
                        musician_id,
                        band_id,
                        active: member.active,
                    },
                );
                if !member.member_name.is_empty() {
                    push_unique(
                        &mut seen_has_name,
                        &mut tuples.has_name,
                        HasNameTuple {
                            musician_id,
                            name: member.member_name.clone(),
                        },
                    );
                }
            }
        }
        Ok(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityMap;
    use crate::source::{Album, Membership};

    fn member(url: &str, name: &str, active: bool) -> Membership {
        Membership {
            member_url: url.to_string(),
            member_name: name.to_string(),
            active,
        }
    }

    fn album(name: &str, sales: i64) -> Album {
        Album {
            name: Some(name.to_string()),
            release_date: CalendarDate::from_ymd(1995, 6, 1),
            description: None,
            running_time: None,
            sales: Some(sales),
        }
    }

    fn bands() -> Vec<Band> {
        vec![
            Band {
                url: "b/1".to_string(),
                name: "One".to_string(),
                genres: vec!["Rock".to_string(), "Pop".to_string(), "Rock".to_string()],
                members: vec![
                    member("m/a", "Ann", true),
                    member("m/a", "Ann", false),
                    member("m/b", "Bob", true),
                ],
                albums: vec![album("Same", 1), album("Same", 1)],
            },
            Band {
                url: "b/2".to_string(),
                name: "Two".to_string(),
                genres: vec!["Pop".to_string(), "Jazz".to_string()],
                members: vec![member("m/a", "Annie", true)],
                albums: vec![],
            },
        ]
    }

    fn maps_for(entities: &EntityTuples) -> IdentityMaps {
        let band_ids: Vec<i64> = (1..=entities.bands.len() as i64).collect();
        let genre_ids: Vec<i64> = (10..10 + entities.genres.len() as i64).collect();
        let musician_ids: Vec<i64> = (100..100 + entities.musicians.len() as i64).collect();
        IdentityMaps {
            bands: IdentityMap::allocate("bands", &entities.band_urls(), &band_ids).unwrap(),
            genres: IdentityMap::allocate("genres", &entities.genres, &genre_ids).unwrap(),
            musicians: IdentityMap::allocate("musicians", &entities.musicians, &musician_ids)
                .unwrap(),
        }
    }

    #[test]
    fn test_entities_are_deduplicated_globally_in_first_occurrence_order() {
        let entities = EntityTuples::project(&bands());
        assert_eq!(entities.band_urls(), vec!["b/1", "b/2"]);
        assert_eq!(entities.genres, vec!["Rock", "Pop", "Jazz"]);
        assert_eq!(entities.musicians, vec!["m/a", "m/b"]);
    }

    #[test]
    fn test_associations_are_deduplicated_and_albums_are_not() {
        let bands = bands();
        let entities = EntityTuples::project(&bands);
        let tuples = AssociationTuples::project(&bands, &maps_for(&entities)).unwrap();

        assert_eq!(tuples.albums.len(), 2);
        assert_eq!(tuples.albums[0].release_date, CalendarDate::from_ymd(1995, 6, 1));
        assert_eq!(
            tuples.has_genre,
            vec![
                HasGenreTuple {
                    band_id: 1,
                    genre_id: 10
                },
                HasGenreTuple {
                    band_id: 1,
                    genre_id: 11
                },
                HasGenreTuple {
                    band_id: 2,
                    genre_id: 11
                },
                HasGenreTuple {
                    band_id: 2,
                    genre_id: 12
                },
            ]
        );
    }

    #[test]
    fn test_member_of_keeps_active_and_former_facts() {
        let bands = bands();
        let entities = EntityTuples::project(&bands);
        let tuples = AssociationTuples::project(&bands, &maps_for(&entities)).unwrap();

        let ann_in_one: Vec<&MemberOfTuple> = tuples
            .member_of
            .iter()
            .filter(|m| m.musician_id == 100 && m.band_id == 1)
            .collect();
        assert_eq!(ann_in_one.len(), 2);
        assert!(ann_in_one.iter().any(|m| m.active));
        assert!(ann_in_one.iter().any(|m| !m.active));
        assert_eq!(tuples.member_of.len(), 4);
    }

    #[test]
    fn test_has_name_is_deduplicated_by_id_and_name() {
        let bands = bands();
        let entities = EntityTuples::project(&bands);
        let tuples = AssociationTuples::project(&bands, &maps_for(&entities)).unwrap();

        let names: Vec<(i64, &str)> = tuples
            .has_name
            .iter()
            .map(|n| (n.musician_id, n.name.as_str()))
            .collect();
        assert_eq!(names, vec![(100, "Ann"), (101, "Bob"), (100, "Annie")]);
    }

    #[test]
    fn test_unknown_genre_is_a_dangling_reference() {
        let bands = bands();
        let entities = EntityTuples::project(&bands);
        let mut maps = maps_for(&entities);
        maps.genres = IdentityMap::allocate("genres", &["Rock", "Pop"], &[10, 11]).unwrap();

        let err = AssociationTuples::project(&bands, &maps).unwrap_err();
        assert_eq!(
            err,
            IdentityError::DanglingReference {
                table: "genres",
                key: "Jazz".to_string()
            }
        );
    }
}
