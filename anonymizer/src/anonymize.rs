//! Applying generated identities to stored records.

use rand::Rng;

use crate::batch::{BatchIterator, VisitError};
use crate::generator::IdentityGenerator;
use crate::interface::{
    AnonymizerError, RecordError, RecordId, RecordKind, RecordOutcome, RecordStore, Summary, UpdateOptions,
};
use crate::models::IdentityBundle;

/// Generated emails must survive transforms intact
fn check_email(bundle: &IdentityBundle) -> Result<(), RecordError> {
    match bundle.email() {
        Some(email) if !validator::validate_email(email) => {
            Err(RecordError::Invalid(format!("generated email '{}' is not valid", email)))
        }
        _ => Ok(()),
    }
}

/// Replace one user's identity.
///
/// The login is always written: the update is issued with `override_login`, which the
/// regular update path would otherwise ignore.
pub fn anonymize_user<S, R>(
    store: &S,
    generator: &mut IdentityGenerator<R>,
    id: RecordId,
    alliterate: bool,
) -> Result<(), VisitError>
where
    S: RecordStore + ?Sized,
    R: Rng,
{
    let bundle = generator.generate(alliterate)?;
    if bundle.login().map_or(true, str::is_empty) {
        return Err(RecordError::Invalid("generated identity has no login".to_string()).into());
    }
    check_email(&bundle)?;
    store.update_user(id, &bundle, UpdateOptions::force_login())?;
    Ok(())
}

/// Replace one comment's author name, email and URL.
pub fn anonymize_comment<S, R>(
    store: &S,
    generator: &mut IdentityGenerator<R>,
    id: RecordId,
    alliterate: bool,
) -> Result<(), VisitError>
where
    S: RecordStore + ?Sized,
    R: Rng,
{
    let bundle = generator.generate(alliterate)?;
    check_email(&bundle)?;
    store.update_comment(id, &bundle)?;
    Ok(())
}

/// Anonymize every non-excluded record of `kind`, reporting each outcome as it happens.
pub fn anonymize_all<S, R, F>(
    store: &S,
    generator: &mut IdentityGenerator<R>,
    iterator: &BatchIterator,
    kind: RecordKind,
    alliterate: bool,
    report: F,
) -> Result<Summary, AnonymizerError>
where
    S: RecordStore + ?Sized,
    R: Rng,
    F: FnMut(&RecordOutcome),
{
    iterator.run(
        store,
        kind,
        |id| match kind {
            RecordKind::User => anonymize_user(store, generator, id, alliterate),
            RecordKind::Comment => anonymize_comment(store, generator, id, alliterate),
        },
        report,
    )
}
