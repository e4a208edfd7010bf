use crate::TodoTask;

/// Sensor state when no task qualifies.
pub const NO_IMPORTANT_TASKS: &str = "No important tasks found";

/// Titles of the open, high-importance tasks, in input order.
pub fn important_titles<'a, I>(tasks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a TodoTask>,
{
    tasks
        .into_iter()
        .filter(|task| task.is_important_open())
        .map(|task| task.title.clone())
        .collect()
}

/// Join titles into the sensor state string.
pub fn summarize(titles: &[String]) -> String {
    if titles.is_empty() {
        NO_IMPORTANT_TASKS.to_string()
    } else {
        titles.join("\n")
    }
}
