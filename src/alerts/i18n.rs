use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::store::EventType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
    Uk,
}

impl Language {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "ru" => Some(Self::Ru),
            "uk" => Some(Self::Uk),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
            Self::Uk => "uk",
        }
    }

    pub(super) fn event_title(self, event_type: EventType) -> &'static str {
        match (self, event_type) {
            (Self::En, EventType::PowerOff) => "POWER OFF",
            (Self::En, EventType::PowerOn) => "POWER ON",
            (Self::Ru, EventType::PowerOff) => "СВЕТ ВЫКЛЮЧИЛСЯ",
            (Self::Ru, EventType::PowerOn) => "СВЕТ ВЕРНУЛСЯ",
            (Self::Uk, EventType::PowerOff) => "СВІТЛО ЗНИКЛО",
            (Self::Uk, EventType::PowerOn) => "СВІТЛО ПОВЕРНУЛОСЯ",
        }
    }

    /// Label for the duration of the state that just ended.
    pub(super) fn previous_state_label(self, event_type: EventType) -> &'static str {
        match (self, event_type) {
            (Self::En, EventType::PowerOff) => "Power was ON for",
            (Self::En, EventType::PowerOn) => "Power was OFF for",
            (Self::Ru, EventType::PowerOff) => "Свет был",
            (Self::Ru, EventType::PowerOn) => "Света не было",
            (Self::Uk, EventType::PowerOff) => "Світло було",
            (Self::Uk, EventType::PowerOn) => "Світла не було",
        }
    }

    pub(super) fn units(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::En => ("s", "m", "h"),
            Self::Ru => ("с", "м", "ч"),
            Self::Uk => ("с", "хв", "год"),
        }
    }

    pub(super) fn daily_report_title(self) -> &'static str {
        match self {
            Self::En => "Daily power report",
            Self::Ru => "Суточный отчёт",
            Self::Uk => "Добовий звіт",
        }
    }

    pub(super) fn week_report_title(self) -> &'static str {
        match self {
            Self::En => "Power this week",
            Self::Ru => "Свет за неделю",
            Self::Uk => "Світло за тиждень",
        }
    }

    /// Marks week rows that show the previous week.
    pub(super) fn previous_week_note(self) -> &'static str {
        match self {
            Self::En => "previous week",
            Self::Ru => "прошлая неделя",
            Self::Uk => "минулий тиждень",
        }
    }

    pub(super) fn weekday(self, weekday: Weekday) -> &'static str {
        const EN: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];
        const RU: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];
        const UK: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Нд"];
        let index = weekday.num_days_from_monday() as usize;
        match self {
            Self::En => EN[index],
            Self::Ru => RU[index],
            Self::Uk => UK[index],
        }
    }

    pub(super) fn daily_report_labels(self) -> DailyLabels {
        match self {
            Self::En => DailyLabels {
                on: "With power",
                off: "Without power",
                no_data: "No data",
                outages: "Outages",
            },
            Self::Ru => DailyLabels {
                on: "Со светом",
                off: "Без света",
                no_data: "Нет данных",
                outages: "Отключений",
            },
            Self::Uk => DailyLabels {
                on: "Зі світлом",
                off: "Без світла",
                no_data: "Немає даних",
                outages: "Відключень",
            },
        }
    }
}

pub(super) struct DailyLabels {
    pub on: &'static str,
    pub off: &'static str,
    pub no_data: &'static str,
    pub outages: &'static str,
}
