//! Shared constants for end-to-end tests
//!
//! When the fixture catalog changes, update only this file and fixtures.rs.

// ============================================================================
// Bands
// ============================================================================

/// "Alpha": Rock (listed twice) and Pop, member M1 both current and former
pub const BAND_A_URL: &str = "https://bands.test/Alpha/1";
pub const BAND_A_NAME: &str = "Alpha";

/// "Beta": Pop, best seller of the late decade
pub const BAND_B_URL: &str = "https://bands.test/Beta/2";
pub const BAND_B_NAME: &str = "Beta";

/// "Gamma": Rock and Metal, has a boundary album dated 01/01/2000
pub const BAND_C_URL: &str = "https://bands.test/Gamma/3";
pub const BAND_C_NAME: &str = "Gamma";

/// Referenced by the genre file only
pub const ORPHAN_BAND_URL: &str = "https://bands.test/Nobody/9";

// ============================================================================
// Musicians
// ============================================================================

pub const MUSICIAN_1_URL: &str = "https://artists.test/One/11";
pub const MUSICIAN_1_NAME: &str = "Mx One";
/// Name M1 goes by in Beta
pub const MUSICIAN_1_ALIAS: &str = "M. One";

pub const MUSICIAN_2_URL: &str = "https://artists.test/Two/12";
pub const MUSICIAN_2_NAME: &str = "Mx Two";

// ============================================================================
// Albums
// ============================================================================

pub const CHRISTMAS_ALBUM: &str = "Winter Solstice";
pub const CHRISTMAS_SOURCE_DATE: &str = "25/12/1999";
pub const CHRISTMAS_RELATIONAL_DATE: &str = "1999-12-25";
pub const CHRISTMAS_DOCUMENT_DATE: &str = "1999-12-25T00:00:00Z";

pub const UNDATED_ALBUM: &str = "Lost Tapes";

/// Albums across all bands, the undated one included
pub const ALBUM_COUNT: usize = 10;

// ============================================================================
// Expected Benchmark Answer
// ============================================================================

/// Early decade: Pop 185 (Alpha 105 + Beta 80), Rock 135 (Alpha 105 + Gamma 30), Metal 30.
pub const EXPECTED_GENRE: &str = "Pop";

/// Late decade among Pop bands: Beta 300 beats Alpha 50.
pub const EXPECTED_BAND_URL: &str = BAND_B_URL;
