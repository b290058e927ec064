use crate::common::{FieldError, VerifyError, Result};
use crate::service::client::ApiClient;
use crate::service::protocol::Profile;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}$").unwrap()
});

pub async fn fetch_profile(client: &ApiClient) -> Result<Profile> {
    client.get_json("/profile").await
}

/// Validates, then saves the profile.
pub async fn update_profile(client: &ApiClient, profile: &Profile) -> Result<()> {
    let errors = validate_profile(profile);
    if !errors.is_empty() {
        return Err(VerifyError::InvalidProfile(errors));
    }
    let _: serde_json::Value = client.put_json("/profile", profile).await?;
    tracing::info!("Profile updated successfully");
    Ok(())
}

pub fn validate_profile(profile: &Profile) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if profile.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    if profile.email.trim().is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !is_valid_email(profile.email.trim()) {
        errors.push(FieldError::new("email", "Invalid email"));
    }

    for (i, edu) in profile.education.iter().enumerate() {
        let field = |name: &str| format!("education.{}.{}", i, name);
        if edu.institution.trim().is_empty() {
            errors.push(FieldError::new(field("institution"), "Institution is required"));
        }
        if edu.degree.trim().is_empty() {
            errors.push(FieldError::new(field("degree"), "Degree is required"));
        }
        if edu.field_of_study.trim().is_empty() {
            errors.push(FieldError::new(field("fieldOfStudy"), "Field of study is required"));
        }
        check_dates(&mut errors, field("startDate"), field("endDate"), edu.start_date, edu.end_date);
    }

    for (i, work) in profile.work_experience.iter().enumerate() {
        let field = |name: &str| format!("workExperience.{}.{}", i, name);
        if work.company.trim().is_empty() {
            errors.push(FieldError::new(field("company"), "Company is required"));
        }
        if work.position.trim().is_empty() {
            errors.push(FieldError::new(field("position"), "Position is required"));
        }
        check_dates(&mut errors, field("startDate"), field("endDate"), work.start_date, work.end_date);
    }

    errors
}

fn check_dates(
    errors: &mut Vec<FieldError>,
    start_field: String,
    end_field: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    match (start, end) {
        (None, _) => errors.push(FieldError::new(start_field, "Start date is required")),
        (Some(start), Some(end)) if end < start => {
            errors.push(FieldError::new(end_field, "End date must be after start date"))
        }
        _ => {}
    }
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::protocol::{Education, WorkExperience};
    use chrono::TimeZone;

    fn date(year: i32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap())
    }

    fn valid_profile() -> Profile {
        Profile {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            education: vec![Education {
                institution: "University of London".into(),
                degree: "BSc".into(),
                field_of_study: "Mathematics".into(),
                start_date: date(2010),
                end_date: date(2013),
            }],
            work_experience: vec![WorkExperience {
                company: "Analytical Engines".into(),
                position: "Programmer".into(),
                start_date: date(2014),
                end_date: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn valid_profile_has_no_errors() {
        assert!(validate_profile(&valid_profile()).is_empty());
    }

    #[test]
    fn reports_all_field_errors_together() {
        let mut profile = valid_profile();
        profile.name = " ".into();
        profile.email = "ada.example.com".into();
        profile.education[0].end_date = date(2009);
        profile.work_experience[0].start_date = None;

        let fields: Vec<String> = validate_profile(&profile).into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "name",
                "email",
                "education.0.endDate",
                "workExperience.0.startDate",
            ]
        );
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a b@c.co"));
        assert!(!is_valid_email("ada@example."));
        assert!(is_valid_email("Ada.Lovelace+id@Mail.Example.org"));
    }
}
