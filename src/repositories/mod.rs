pub(crate) mod attempts;
pub(crate) mod classes;
pub(crate) mod exams;
pub(crate) mod users;
