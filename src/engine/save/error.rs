// ============================================
// Save Error - Ошибки сохранения/загрузки
// ============================================

use std::fmt;

/// Ошибки сохранения/загрузки
#[derive(Debug)]
pub enum SaveError {
    /// Ошибка файловой системы
    Io(std::io::Error),
    /// Повреждённые или обрезанные данные
    Decode(&'static str),
    /// Удалённое хранилище недоступно или вернуло мусор
    Remote(String),
    /// Сохранение не найдено ни локально, ни удалённо
    NotFound(String),
    /// Не подключён обязательный внешний компонент
    MissingCollaborator(&'static str),
    /// Спавнер отказался создавать куб
    Spawn(String),
    /// Загрузка отменена через токен
    Cancelled,
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SaveError::Decode("unexpected end of data")
        } else {
            SaveError::Io(e)
        }
    }
}

impl From<bincode::Error> for SaveError {
    fn from(e: bincode::Error) -> Self {
        match *e {
            bincode::ErrorKind::Io(io) => io.into(),
            _ => SaveError::Decode("malformed binary data"),
        }
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "io error: {}", e),
            SaveError::Decode(what) => write!(f, "corrupt save data: {}", what),
            SaveError::Remote(msg) => write!(f, "remote store error: {}", msg),
            SaveError::NotFound(what) => write!(f, "save not found: {}", what),
            SaveError::MissingCollaborator(what) => write!(f, "missing collaborator: {}", what),
            SaveError::Spawn(msg) => write!(f, "spawn failed: {}", msg),
            SaveError::Cancelled => write!(f, "load cancelled"),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SaveError::Io(e) => Some(e),
            _ => None,
        }
    }
}
