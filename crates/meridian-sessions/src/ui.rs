//! User-facing message templates. The bot lives in bilingual RU/EN chats;
//! the strings mirror that.

pub fn onboarding_prompt() -> String {
    "🌍 Какой твой город? (для часового пояса)\nПримеры: NY, Москва, London, Berlin".to_string()
}

pub fn reverify_prompt(existing_tz: &str) -> String {
    format!(
        "🔄 Твоя таймзона всё ещё {}?\nНапиши 'да' или новый город",
        existing_tz
    )
}

pub fn confirm_relocation(city: &str, tz: &str) -> String {
    format!(
        "📍 Ты теперь в <b>{}</b> ({})?\nНапиши 'да' или другой город",
        city, tz
    )
}

pub fn ask_city() -> String {
    "Хорошо, напиши город, в котором ты сейчас находишься:".to_string()
}

pub fn city_not_found(input: &str) -> String {
    format!(
        "Не нашёл город '{}'. Напиши точнее (например: Moscow, London, Tokyo):",
        input
    )
}

pub fn saved(tz: &str) -> String {
    format!("✅ Saved: <b>{}</b>", tz)
}

pub fn session_failed(verify_url: Option<&str>) -> String {
    match verify_url {
        Some(url) => format!(
            "Не получилось определить таймзону 😔\nМожно указать её вручную: <a href=\"{}\">Verify TZ</a>",
            url
        ),
        None => "Не получилось определить таймзону 😔 Попробуй ещё раз позже.".to_string(),
    }
}

pub fn rate_limited(retry_after: u64) -> String {
    format!(
        "⏳ Слишком много запросов. Попробуй через {} сек.",
        retry_after.max(1)
    )
}

pub fn help_blurb() -> String {
    "🕐 Я конвертирую время в таймзоны участников чата.\n\
     Напиши время (например '15:00' или '3pm PST') — покажу его для всех.\n\
     Скажи 'переехал в <город>' — обновлю твою таймзону."
        .to_string()
}
