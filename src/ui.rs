use crate::meditation::MeditationStatus;
use crate::models::{Identity, StatsResponse};
use crate::symptoms::{SymptomCatalog, SymptomSelection};
use crate::wellness::{HealthTip, Quote};
use crate::wizard::{StepState, WizardContext};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use serde_json::Value;

const FEATURES: [(&str, &str, &str); 3] = [
    ("/symptoms", "Symptom Tracker", "Log how your body feels today."),
    ("/wellness", "Wellness Hub", "Tips, nutrition, meditation and water."),
    ("/setup", "Cycle Profile", "Tell us about your cycle."),
];

pub fn render_auth_status(identity: Option<&Identity>, login_url: &str) -> String {
    match identity {
        Some(identity) => {
            let shown = if identity.name.is_empty() {
                &identity.email
            } else {
                &identity.name
            };
            format!(
                r#"<div id="auth-status"><span class="who">{}</span> <form method="post" action="/logout" class="inline"><button type="submit" class="link">Logout</button></form></div>"#,
                text(shown)
            )
        }
        None => format!(
            r#"<div id="auth-status"><a href="{}">Login</a></div>"#,
            attr(login_url)
        ),
    }
}

pub fn render_index(auth: &str, stats: &StatsResponse) -> String {
    let features: String = FEATURES
        .iter()
        .map(|(target, title, blurb)| {
            format!(
                r#"<a class="card feature" href="/go?target={}"><h3>{}</h3><p>{}</p></a>"#,
                attr(&urlencoding::encode(target)),
                text(title),
                text(blurb)
            )
        })
        .collect();

    let body = format!(
        r#"<section class="grid">{features}</section>
<section class="card">
  <h2>This week</h2>
  <p>{} days tracked &middot; {} meditation minutes &middot; {} glasses of water today</p>
</section>"#,
        stats.days_tracked, stats.meditation_minutes, stats.water_today
    );
    page("Eraya", auth, &body, "")
}

pub fn render_setup(context: &WizardContext, notice: Option<&str>) -> String {
    let progress: String = context
        .progress()
        .iter()
        .enumerate()
        .map(|(index, state)| {
            let class = match state {
                StepState::Completed => "completed",
                StepState::Active => "active",
                StepState::Pending => "pending",
            };
            format!(r#"<li class="progress-step {class}">{}</li>"#, index + 1)
        })
        .collect();

    let fields = match context.current_step() {
        1 => format!(
            r#"<label>Name <input name="name" required value="{}"></label>
<label>Age <input name="age" type="number" min="8" max="80" value="{}"></label>"#,
            attr(context.answer_text("name")),
            attr(context.answer_text("age"))
        ),
        2 => format!(
            r#"<label>First day of your last period <input name="lastPeriod" type="date" required value="{}"></label>
<label>Cycle length (days) <input name="cycleLength" type="number" min="15" max="60" placeholder="28" value="{}"></label>
<label>Period length (days) <input name="periodLength" type="number" min="1" max="15" placeholder="5" value="{}"></label>"#,
            attr(context.answer_text("lastPeriod")),
            attr(context.answer_text("cycleLength")),
            attr(context.answer_text("periodLength"))
        ),
        _ => {
            let concerns: String = ["Cramps", "Mood", "Acne", "Fatigue", "Irregular cycles"]
                .iter()
                .map(|concern| {
                    let checked = if has_answer(context, "concerns", concern) {
                        " checked"
                    } else {
                        ""
                    };
                    format!(
                        r#"<label class="check"><input type="checkbox" name="concerns" value="{}"{checked}> {}</label>"#,
                        attr(concern),
                        text(concern)
                    )
                })
                .collect();
            format!(
                r#"<fieldset><legend>What would you like help with?</legend>{concerns}</fieldset>
<label>Goals <textarea name="goals">{}</textarea></label>"#,
                text(context.answer_text("goals"))
            )
        }
    };

    let back = if context.current_step() > 1 {
        r#"<button type="submit" name="action" value="prev" formnovalidate>Back</button>"#
    } else {
        ""
    };
    let forward = if context.is_last_step() {
        r#"<button type="submit" name="action" value="submit" class="primary">Finish setup</button>"#
    } else {
        r#"<button type="submit" name="action" value="next" class="primary">Next</button>"#
    };
    let notice = notice
        .map(|message| format!(r#"<p class="notice error">{}</p>"#, text(message)))
        .unwrap_or_default();

    let body = format!(
        r#"<section class="card">
  <h2>Welcome, {}</h2>
  <ol class="progress">{progress}</ol>
  {notice}
  <form id="setupForm" method="post" action="/setup">
    <div class="form-step" data-step="{}">{fields}</div>
    <div class="actions">{back}{forward}</div>
  </form>
</section>"#,
        text(&context.identity().name),
        context.current_step()
    );
    page("Set up your profile", "", &body, "")
}

fn has_answer(context: &WizardContext, key: &str, wanted: &str) -> bool {
    match context.answers().get(key) {
        Some(Value::String(value)) => value == wanted,
        Some(Value::Array(values)) => values.iter().any(|value| value.as_str() == Some(wanted)),
        _ => false,
    }
}

pub fn render_symptoms(
    auth: &str,
    date: &str,
    catalog: &SymptomCatalog,
    selection: &SymptomSelection,
) -> String {
    let categories: String = catalog
        .categories()
        .iter()
        .map(|category| {
            let chips: String = category
                .chips
                .iter()
                .map(|chip| {
                    let selected = if selection.contains(&category.name, &chip.value) {
                        " selected"
                    } else {
                        ""
                    };
                    format!(
                        r#"<button type="button" class="chip{selected}" data-category="{}" data-value="{}">{}</button>"#,
                        attr(&category.name),
                        attr(&chip.value),
                        text(&chip.label)
                    )
                })
                .collect();
            format!(
                r#"<div class="symptom-category" data-category="{}"><h3>{}</h3><div class="chips">{chips}</div></div>"#,
                attr(&category.name),
                text(&category.title)
            )
        })
        .collect();

    let body = format!(
        r#"<section class="card">
  <h2>How are you feeling on {}?</h2>
  <input id="symptomSearch" type="search" placeholder="Search symptoms">
  {categories}
  <p><span id="selectedCount">{}</span> selected</p>
  <button id="saveSymptoms" class="primary">Save</button>
  <p id="saveMessage" class="notice"></p>
</section>"#,
        text(date),
        selection.len()
    );
    page("Symptom Tracker", auth, &body, SYMPTOMS_SCRIPT)
}

pub fn render_wellness(
    auth: &str,
    quote: &Quote,
    tips: &[HealthTip],
    stats: &StatsResponse,
    meditation: &MeditationStatus,
) -> String {
    let tips: String = tips
        .iter()
        .map(|tip| {
            format!(
                r#"<div class="tip"><h4>{}</h4><p>{}</p></div>"#,
                text(&tip.title),
                text(&tip.description)
            )
        })
        .collect();

    let body = format!(
        r#"<section class="card quote"><blockquote>{}</blockquote><cite>{}</cite></section>
<section class="card"><h2>Health tips</h2><div class="tips">{tips}</div></section>
<section class="card">
  <h2>Nutrition by phase</h2>
  <select id="phase">
    <option value="menstrual">Menstrual</option>
    <option value="follicular">Follicular</option>
    <option value="ovulation">Ovulation</option>
    <option value="luteal">Luteal</option>
  </select>
  <ul id="foods"></ul>
</section>
<section class="card">
  <h2>Movement</h2>
  <button class="exercise" data-kind="yoga">Yoga</button>
  <button class="exercise" data-kind="walking">Walking</button>
  <button class="exercise" data-kind="stretching">Stretching</button>
  <div id="exerciseDetails"></div>
</section>
<section class="card">
  <h2>Meditation</h2>
  <input id="meditationMinutes" type="number" min="1" value="{}">
  <button id="startMeditation">Start</button>
  <button id="stopMeditation">Stop</button>
  <p id="meditationTimer">{}</p>
</section>
<section class="card">
  <h2>Your stats</h2>
  <p>Days tracked: <span id="daysTracked">{}</span></p>
  <p>Workouts: <span id="workouts">{}</span></p>
  <p>Meditation minutes: <span id="meditationTotal">{}</span></p>
  <p>Water today: <span id="waterToday">{}</span> <button id="addWater">+1 glass</button></p>
  <p id="wellnessMessage" class="notice"></p>
</section>"#,
        text(&quote.text),
        text(&quote.author),
        if meditation.minutes > 0 { meditation.minutes } else { 10 },
        text(&meditation.display),
        stats.days_tracked,
        stats.workouts,
        stats.meditation_minutes,
        stats.water_today
    );
    page("Wellness Hub", auth, &body, WELLNESS_SCRIPT)
}

fn page(title: &str, auth: &str, body: &str, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{}</title>
  <style>{STYLE}</style>
</head>
<body>
  <header><a href="/" class="brand">Eraya</a>{auth}</header>
  <main class="app">
    <h1>{}</h1>
    {body}
  </main>
  <script>{script}</script>
</body>
</html>
"#,
        text(title),
        text(title)
    )
}

const STYLE: &str = r#"
:root { --bg: #fdf2f4; --ink: #3a2a33; --accent: #c2185b; --card: #ffffff; }
* { box-sizing: border-box; }
body { margin: 0; background: var(--bg); color: var(--ink); font-family: "Trebuchet MS", sans-serif; }
header { display: flex; justify-content: space-between; align-items: center; padding: 16px 24px; background: var(--accent); color: #fff; }
header a, header .link { color: #fff; }
.brand { font-weight: 700; text-decoration: none; }
.app { width: min(880px, 100%); margin: 0 auto; padding: 24px; display: grid; gap: 20px; }
.card { background: var(--card); border-radius: 18px; padding: 20px; box-shadow: 0 12px 30px rgba(58, 42, 51, 0.08); }
.grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 16px; }
.feature { color: inherit; text-decoration: none; }
.progress { display: flex; gap: 12px; list-style: none; padding: 0; }
.progress-step { width: 32px; height: 32px; border-radius: 50%; display: grid; place-items: center; background: #eee; }
.progress-step.active { background: var(--accent); color: #fff; }
.progress-step.completed { background: #f8bbd0; }
label { display: block; margin: 12px 0; }
.chip { border: 1px solid var(--accent); background: #fff; border-radius: 999px; padding: 6px 14px; margin: 4px; cursor: pointer; }
.chip.selected { background: var(--accent); color: #fff; }
.notice.error { color: #b00020; }
.inline { display: inline; }
.link { background: none; border: none; cursor: pointer; text-decoration: underline; }
.primary { background: var(--accent); color: #fff; border: none; border-radius: 10px; padding: 10px 18px; }
"#;

const SYMPTOMS_SCRIPT: &str = r#"
async function postJson(url, body) {
  const response = await fetch(url, { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
  return response.json();
}

document.querySelectorAll('.chip').forEach(function(chip) {
  chip.addEventListener('click', async function() {
    const selection = await postJson('/api/symptoms/toggle', { category: chip.dataset.category, value: chip.dataset.value });
    const items = selection[chip.dataset.category] || [];
    chip.classList.toggle('selected', items.some(function(item) { return item.value === chip.dataset.value; }));
    document.getElementById('selectedCount').textContent = Object.values(selection).reduce(function(sum, list) { return sum + list.length; }, 0);
  });
});

document.getElementById('symptomSearch').addEventListener('input', async function(event) {
  const response = await fetch('/api/symptoms/search?q=' + encodeURIComponent(event.target.value));
  const visible = await response.json();
  document.querySelectorAll('.symptom-category').forEach(function(section) {
    const category = visible.find(function(entry) { return entry.name === section.dataset.category; });
    section.hidden = !category;
    section.querySelectorAll('.chip').forEach(function(chip) {
      chip.hidden = !category || !category.chips.some(function(item) { return item.value === chip.dataset.value; });
    });
  });
});

document.getElementById('saveSymptoms').addEventListener('click', async function() {
  const result = await postJson('/api/symptoms/save', {});
  const message = document.getElementById('saveMessage');
  message.textContent = result.message;
  message.classList.toggle('error', result.status === 'error');
});
"#;

const WELLNESS_SCRIPT: &str = r#"
let poll = null;

async function showFoods(phase) {
  const response = await fetch('/api/wellness/nutrition/' + encodeURIComponent(phase));
  const data = await response.json();
  const list = document.getElementById('foods');
  list.innerHTML = '';
  if (data.foods.length === 0 && data.notice) {
    const item = document.createElement('li');
    item.textContent = data.notice;
    list.appendChild(item);
  }
  data.foods.forEach(function(food) {
    const item = document.createElement('li');
    item.textContent = food.icon + ' ' + food.name;
    list.appendChild(item);
  });
}

async function refreshMeditation() {
  const status = await (await fetch('/api/wellness/meditation')).json();
  document.getElementById('meditationTimer').textContent = status.completed ? 'Session complete' : status.display;
  if (!status.running && poll) {
    clearInterval(poll);
    poll = null;
    refreshStats();
  }
}

async function refreshStats() {
  const stats = await (await fetch('/api/wellness/stats')).json();
  document.getElementById('daysTracked').textContent = stats.days_tracked;
  document.getElementById('workouts').textContent = stats.workouts;
  document.getElementById('meditationTotal').textContent = stats.meditation_minutes;
  document.getElementById('waterToday').textContent = stats.water_today;
}

document.getElementById('phase').addEventListener('change', function(event) { showFoods(event.target.value); });
showFoods('menstrual');

document.querySelectorAll('.exercise').forEach(function(button) {
  button.addEventListener('click', async function() {
    const response = await fetch('/api/wellness/exercise/' + button.dataset.kind);
    const target = document.getElementById('exerciseDetails');
    if (!response.ok) { target.textContent = ''; return; }
    const details = await response.json();
    target.textContent = details.title + ' (' + details.duration + '): ' + details.benefits + '. ' + details.bulletsTitle + ': ' + details.bullets.join(', ');
  });
});

document.getElementById('startMeditation').addEventListener('click', async function() {
  const minutes = document.getElementById('meditationMinutes').value;
  const response = await fetch('/api/wellness/meditation', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify({ minutes: minutes }) });
  const data = await response.json();
  if (!response.ok) { alert(data.error); return; }
  if (!poll) { poll = setInterval(refreshMeditation, 1000); }
  refreshMeditation();
});

document.getElementById('stopMeditation').addEventListener('click', async function() {
  await fetch('/api/wellness/meditation/stop', { method: 'POST' });
  refreshMeditation();
});

document.getElementById('addWater').addEventListener('click', async function() {
  const response = await fetch('/api/wellness/water', { method: 'POST' });
  const data = await response.json();
  const message = document.getElementById('wellnessMessage');
  if (!response.ok) { message.textContent = data.error; message.classList.add('error'); return; }
  message.textContent = '';
  document.getElementById('waterToday').textContent = data.glasses;
});
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symptoms::SymptomCatalog;

    fn identity(email: &str, name: Option<&str>) -> Identity {
        Identity::from_parts(Some(email), name).unwrap()
    }

    #[test]
    fn auth_status_escapes_the_shown_name() {
        let html = render_auth_status(Some(&identity("a@x.com", Some("<b>Ann</b>"))), "/login.html");
        assert!(html.contains("&lt;b&gt;Ann&lt;/b&gt;"));
        assert!(html.contains("Logout"));

        let anonymous = render_auth_status(None, "/login.html");
        assert!(anonymous.contains(r#"href="/login.html""#));
    }

    #[test]
    fn setup_page_shows_the_current_step() {
        let context = WizardContext::new(identity("a@x.com", Some("Ann")));
        let html = render_setup(&context, Some("Please fill in all required fields"));
        assert!(html.contains(r#"name="name" required value="Ann""#));
        assert!(html.contains(r#"value="next""#));
        assert!(!html.contains(r#"value="prev""#));
        assert!(html.contains("Please fill in all required fields"));
    }

    #[test]
    fn symptom_page_marks_selected_chips() {
        let catalog = SymptomCatalog::standard();
        let mut selection = SymptomSelection::new();
        selection.add("physical", "cramps", "Cramps");

        let html = render_symptoms("", "2026-01-05", &catalog, &selection);
        assert!(html.contains(r#"class="chip selected" data-category="physical" data-value="cramps""#));
        assert!(html.contains(r#"class="chip" data-category="physical" data-value="headache""#));
    }
}
