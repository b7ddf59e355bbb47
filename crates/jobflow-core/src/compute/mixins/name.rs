//! Nombres de job: validación, unique names y el nombre de archivo derivado.

use uuid::Uuid;

use crate::compute::job::JobKind;
use crate::constants::UNIQUE_NAME_SUFFIX_LEN;
use crate::errors::{JobError, JobResult};

pub(crate) fn check_not_empty(job: &str, param: &str, value: &str) -> JobResult<()> {
    if value.is_empty() {
        return Err(JobError::invalid_arguments(
            job,
            format!("Empty strings not allowed for parameter \"{param}\""),
        ));
    }
    Ok(())
}

/// Slug ASCII: minúsculas y guiones, sin repeticiones ni bordes.
pub(crate) fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Unique name de un job aplicado: `{kind}-{name}` en slug más un fragmento
/// aleatorio de uuid.
pub(crate) fn generate_unique_name(kind: JobKind, name: &str) -> String {
    let slug = slugify(&format!("{kind}-{name}"));
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{slug}-{}", &uuid[..UNIQUE_NAME_SUFFIX_LEN])
}

/// Nombre lógico para archivos: el unique name sin su sufijo aleatorio, con
/// guiones bajos.
pub(crate) fn job_name_from_unique_name(unique_name: &str) -> String {
    let head = match unique_name.rsplit_once('-') {
        Some((head, _suffix)) => head,
        None => unique_name,
    };
    head.replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_case_and_separators() {
        assert_eq!(slugify("My Task_Name"), "my-task-name");
        assert_eq!(slugify("--ya--slugificado--"), "ya-slugificado");
        assert_eq!(slugify("task-plain"), "task-plain");
    }

    #[test]
    fn unique_names_differ_between_generations() {
        let a = generate_unique_name(JobKind::Task, "my task");
        let b = generate_unique_name(JobKind::Task, "my task");
        assert!(a.starts_with("task-my-task-"));
        assert_ne!(a, b);
        let suffix = a.rsplit_once('-').unwrap().1;
        assert_eq!(suffix.len(), UNIQUE_NAME_SUFFIX_LEN);
    }

    #[test]
    fn job_name_drops_suffix_and_uses_underscores() {
        assert_eq!(job_name_from_unique_name("task-my-task-1a2b3c4d"), "task_my_task");
        assert_eq!(job_name_from_unique_name("linear-flow-etl-00ff00ff"),
                   "linear_flow_etl");
    }

    #[test]
    fn empty_name_is_rejected_with_parameter_message() {
        let err = check_not_empty("double", "name", "").unwrap_err();
        assert!(err.to_string()
                   .contains("Empty strings not allowed for parameter \"name\""));
        assert!(check_not_empty("double", "name", "double").is_ok());
    }
}
