//! Derived attributes (spec §4.6): values the hub computes rather than relays verbatim
//! — `eduPersonTargetedID`, a `schacHomeOrganization` fallback, a `displayName`
//! fallback, Danish CPR-derived date/year of birth, and affiliation closure.

use sha1::{Digest, Sha1};

use super::AttributeSet;

fn len_prefixed(s: &str) -> String {
    format!("{}:{}", s.len(), s)
}

/// Computes `eduPersonTargetedID` as `"WAYF-DK-" || hex(sha1(...))` (spec §4.6) — stable
/// per (IdP, SP, subject) triple, unlinkable across SPs without the salt. `idp_peid` and
/// `sp_peid` are each the `persistentEntityID` extension if the entity carries one, else
/// its entityID; `sp_peid` additionally has any `-proxy` suffix (a Birk/Krib mirrored
/// entityID) stripped so a proxied and a direct SP resolve to the same value.
pub fn derive_eptid(idp_peid: &str, sp_peid: &str, eppn_for_eptid: &str, salt: &str) -> String {
    let sp_peid = sp_peid.strip_suffix("-proxy").unwrap_or(sp_peid);
    let mut hasher = Sha1::new();
    hasher.update(salt.as_bytes());
    hasher.update(len_prefixed(idp_peid).as_bytes());
    hasher.update(len_prefixed(sp_peid).as_bytes());
    hasher.update(len_prefixed(eppn_for_eptid).as_bytes());
    hasher.update(salt.as_bytes());
    format!("WAYF-DK-{}", hex::encode(hasher.finalize()))
}

/// Affiliations that imply membership in the broader `"member"` affiliation per the
/// eduPerson specification's closure rules (spec §4.6 edge case: "affiliation closure").
const MEMBER_IMPLYING: &[&str] = &["faculty", "staff", "student", "employee", "affiliate"];

fn close_affiliations(values: &mut Vec<String>) {
    let implies_member = values.iter().any(|v| {
        let base = v.split('@').next().unwrap_or(v);
        MEMBER_IMPLYING.contains(&base)
    });
    let has_member = values.iter().any(|v| v.split('@').next() == Some("member"));
    if implies_member && !has_member {
        let suffix = values
            .first()
            .and_then(|v| v.split_once('@'))
            .map(|(_, s)| format!("@{s}"))
            .unwrap_or_default();
        values.push(format!("member{suffix}"));
    }
}

/// Resolves a Danish CPR control-digit century per the public algorithm: digits 0-3 are
/// always 1900s; 4 or 9 are 2000s if the two-digit year is ≤36, else 1900s; 5-8 are
/// 2000s if the year is ≤57, else 1800s.
fn cpr_century(control_digit: u8, yy: u32) -> u32 {
    match control_digit {
        0..=3 => 1900,
        4 | 9 => if yy <= 36 { 2000 } else { 1900 },
        5..=8 => if yy <= 57 { 2000 } else { 1800 },
        _ => 1900,
    }
}

/// Parses a 10-digit Danish CPR number (`DDMMYY-SSSS` or `DDMMYYSSSS`) into
/// (year, month, day).
fn parse_cpr(cpr: &str) -> Option<(u32, u32, u32)> {
    let digits: String = cpr.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 10 {
        return None;
    }
    let day: u32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let yy: u32 = digits[4..6].parse().ok()?;
    let control_digit: u8 = digits.as_bytes()[6] - b'0';
    let year = cpr_century(control_digit, yy) + yy;
    Some((year, month, day))
}

fn schac_personal_unique_id_cpr(values: &[String]) -> Option<&str> {
    values.iter().find_map(|v| v.rsplit_once(":dk:CPR:").map(|(_, cpr)| cpr))
}

pub fn derive_attributes(mut attrs: AttributeSet, home_organization: &str) -> AttributeSet {
    attrs
        .entry("schacHomeOrganization".to_string())
        .or_insert_with(|| vec![home_organization.to_string()]);

    if !attrs.contains_key("displayName") {
        let given = attrs.get("givenName").and_then(|v| v.first()).cloned();
        let sn = attrs.get("sn").and_then(|v| v.first()).cloned();
        if let (Some(g), Some(s)) = (given, sn) {
            attrs.insert("displayName".to_string(), vec![format!("{g} {s}")]);
        }
    }

    if let Some(affiliations) = attrs.get_mut("eduPersonAffiliation") {
        close_affiliations(affiliations);
    }

    if let Some(cpr) = attrs
        .get("schacPersonalUniqueID")
        .and_then(|v| schac_personal_unique_id_cpr(v))
    {
        if let Some((year, month, day)) = parse_cpr(cpr) {
            attrs.insert(
                "schacDateOfBirth".to_string(),
                vec![format!("{year:04}{month:02}{day:02}")],
            );
            attrs.insert("schacYearOfBirth".to_string(), vec![year.to_string()]);
        }
    }

    attrs
}
