use crate::ownership::OwnershipSet;

/// Keep the changes that touch at least one file in a directory of `owned`.
///
/// `touched_files_of` enumerates the files of one change. It is consumed
/// lazily and abandoned at the first owned file. Its first error aborts the
/// whole filter; no partial result is returned. A change touching no files
/// is dropped.
pub fn filter_by_ownership<C, I, P, E, F>(
    changes: impl IntoIterator<Item = C>,
    owned: &OwnershipSet,
    mut touched_files_of: F,
) -> Result<Vec<C>, E>
where
    F: FnMut(&C) -> Result<I, E>,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut kept = Vec::new();
    for change in changes {
        let touched = touched_files_of(&change)?;
        if touched
            .into_iter()
            .any(|path| owned.owns_file(path.as_ref()))
        {
            kept.push(change);
        }
    }
    Ok(kept)
}
